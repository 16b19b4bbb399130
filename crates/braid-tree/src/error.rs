use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("message not found: {0}")]
    MessageNotFound(String),

    #[error("branch not found: {0}")]
    BranchNotFound(String),

    #[error("branch {branch} does not belong to message {message}")]
    BranchNotInMessage { branch: String, message: String },

    #[error("invalid parent branch: {0}")]
    InvalidParent(String),

    #[error("invalid split offset {offset} for branch {branch}")]
    InvalidSplitOffset { branch: String, offset: usize },
}

impl From<TreeError> for braid_core::BraidError {
    fn from(e: TreeError) -> Self {
        match &e {
            TreeError::MessageNotFound(_) | TreeError::BranchNotFound(_) => {
                braid_core::BraidError::NotFound(e.to_string())
            }
            _ => braid_core::BraidError::Validation(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, TreeError>;
