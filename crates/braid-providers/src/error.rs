use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("no eligible provider profile")]
    NotEligible,

    #[error("generation slot busy")]
    Busy,
}

/// Cancellation is normal cooperative-cancel flow (§4.6) and callers should
/// intercept `ProviderError::Cancelled` before it reaches this conversion;
/// it only falls through here via `?` in code paths that don't distinguish
/// it, so it still needs a reasonable taxonomy home.
impl From<ProviderError> for braid_core::BraidError {
    fn from(e: ProviderError) -> Self {
        use braid_core::{BraidError, UpstreamKind};
        match e {
            ProviderError::NotEligible => BraidError::NotEligible("no provider profile matches".to_string()),
            ProviderError::Busy => BraidError::Busy("generation already in flight".to_string()),
            ProviderError::Cancelled => BraidError::upstream(UpstreamKind::Timeout, "request cancelled"),
            ProviderError::RateLimited { retry_after_ms } => BraidError::upstream(
                UpstreamKind::RateLimited,
                format!("rate limited, retry after {retry_after_ms}ms"),
            ),
            ProviderError::Unavailable(msg) => BraidError::upstream(UpstreamKind::Overloaded, msg),
            ProviderError::Api { status, message } if status == 401 || status == 403 => {
                BraidError::upstream(UpstreamKind::AuthFailed, message)
            }
            ProviderError::Api { message, .. } => BraidError::upstream(UpstreamKind::ServerError, message),
            ProviderError::Parse(msg) => BraidError::upstream(UpstreamKind::ServerError, msg),
            ProviderError::Http(e) => BraidError::upstream(UpstreamKind::ServerError, e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
