use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("conversation {0} not found")]
    ConversationNotFound(String),

    #[error(transparent)]
    Storage(#[from] braid_storage::StorageError),

    #[error(transparent)]
    Tree(#[from] braid_tree::error::TreeError),

    #[error(transparent)]
    Grant(#[from] braid_grants::GrantError),

    #[error(transparent)]
    Room(#[from] braid_rooms::RoomError),

    #[error(transparent)]
    Braid(#[from] braid_core::BraidError),
}

impl From<EngineError> for braid_core::BraidError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::ConversationNotFound(id) => braid_core::BraidError::NotFound(id),
            EngineError::Storage(e) => braid_core::BraidError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                e.to_string(),
            )),
            EngineError::Tree(e) => e.into(),
            EngineError::Grant(e) => e.into(),
            EngineError::Room(e) => e.into(),
            EngineError::Braid(e) => e,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
