use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("no connection registered for {0}")]
    UnknownConnection(String),

    #[error("generation already in flight for this conversation")]
    Busy,
}

impl From<RoomError> for braid_core::BraidError {
    fn from(e: RoomError) -> Self {
        match e {
            RoomError::Busy => braid_core::BraidError::Busy("generation already in flight".to_string()),
            RoomError::UnknownConnection(c) => braid_core::BraidError::NotFound(c),
        }
    }
}

pub type Result<T> = std::result::Result<T, RoomError>;
