pub mod estimator;
pub mod rolling;
pub mod strategy;

pub use estimator::{estimate_message_tokens, estimate_text_tokens, estimate_total_tokens};
pub use rolling::{PrepareMetadata, RollingConfig, RollingState, RollingStrategy};
pub use strategy::{ContextStrategy, PreparedContext, ProviderHints};
