use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("log not initialized: {0}")]
    NotInitialized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<StorageError> for braid_core::BraidError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotInitialized(msg) => braid_core::BraidError::Internal(msg),
            StorageError::NotFound(what) => braid_core::BraidError::NotFound(what),
            StorageError::Io(io) => braid_core::BraidError::IoError(io),
            StorageError::Serde(e) => braid_core::BraidError::Internal(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
