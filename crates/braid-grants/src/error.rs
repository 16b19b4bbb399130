use thiserror::Error;

#[derive(Debug, Error)]
pub enum GrantError {
    #[error("invite code {0} not found")]
    InviteNotFound(String),

    #[error("invite code {0} already exists")]
    InviteAlreadyExists(String),

    #[error("invite code {0} has expired")]
    InviteExpired(String),

    #[error("invite code {0} has reached its use limit")]
    InviteExhausted(String),
}

impl From<GrantError> for braid_core::BraidError {
    fn from(e: GrantError) -> Self {
        match e {
            GrantError::InviteNotFound(c) => braid_core::BraidError::NotFound(c),
            GrantError::InviteAlreadyExists(c) => braid_core::BraidError::Conflict(c),
            GrantError::InviteExpired(c) | GrantError::InviteExhausted(c) => {
                braid_core::BraidError::Conflict(c)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, GrantError>;
