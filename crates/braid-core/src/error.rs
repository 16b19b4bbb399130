use thiserror::Error;

/// Sub-kind of an `Upstream` failure, used to pick a user-facing message and
/// suggestion in the streaming layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpstreamKind {
    RateLimited,
    Overloaded,
    ContextTooLong,
    AuthFailed,
    ContentFiltered,
    Timeout,
    ServerError,
    EndpointNotFound,
    InsufficientCredits,
}

impl UpstreamKind {
    /// Short human message + suggestion pair for an `error` frame.
    pub fn message_and_suggestion(&self) -> (&'static str, &'static str) {
        match self {
            UpstreamKind::RateLimited => (
                "The provider is rate-limiting requests",
                "wait a moment and try again",
            ),
            UpstreamKind::Overloaded => (
                "The provider is overloaded",
                "retry shortly or switch provider",
            ),
            UpstreamKind::ContextTooLong => (
                "The conversation is too long for this model",
                "start a new conversation or trim context",
            ),
            UpstreamKind::AuthFailed => (
                "Provider credentials were rejected",
                "check the configured API key",
            ),
            UpstreamKind::ContentFiltered => (
                "The provider refused to generate this content",
                "rephrase the request",
            ),
            UpstreamKind::Timeout => (
                "The provider did not respond in time",
                "try again",
            ),
            UpstreamKind::ServerError => (
                "The provider returned a server error",
                "try again later",
            ),
            UpstreamKind::EndpointNotFound => (
                "The configured provider endpoint was not found",
                "check the provider configuration",
            ),
            UpstreamKind::InsufficientCredits => (
                "Not enough balance to complete this request",
                "add credits or switch provider",
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum BraidError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("busy: {0}")]
    Busy(String),

    #[error("no eligible provider profile: {0}")]
    NotEligible(String),

    #[error("upstream error ({kind:?}): {message}")]
    Upstream {
        kind: UpstreamKind,
        message: String,
    },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BraidError {
    /// Closed taxonomy code, as surfaced to callers.
    pub fn code(&self) -> &'static str {
        match self {
            BraidError::Validation(_) => "VALIDATION",
            BraidError::NotFound(_) => "NOT_FOUND",
            BraidError::PermissionDenied(_) => "PERMISSION_DENIED",
            BraidError::Conflict(_) => "CONFLICT",
            BraidError::Busy(_) => "BUSY",
            BraidError::NotEligible(_) => "NOT_ELIGIBLE",
            BraidError::Upstream { .. } => "UPSTREAM",
            BraidError::IoError(_) => "IO_ERROR",
            BraidError::Internal(_) => "INTERNAL",
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        BraidError::NotFound(what.into())
    }

    pub fn validation(what: impl Into<String>) -> Self {
        BraidError::Validation(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        BraidError::Conflict(what.into())
    }

    pub fn upstream(kind: UpstreamKind, message: impl Into<String>) -> Self {
        BraidError::Upstream {
            kind,
            message: message.into(),
        }
    }
}

/// serde_json failures surface as an internal error — parse failures at the
/// log boundary are handled explicitly by the caller (§4.2 malformed lines
/// never abort replay), this conversion is for ambient (de)serialization
/// elsewhere (config, wire frames).
impl From<serde_json::Error> for BraidError {
    fn from(e: serde_json::Error) -> Self {
        BraidError::Internal(format!("serialization error: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, BraidError>;
