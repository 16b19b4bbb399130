pub mod driver;
pub mod error;
pub mod provider_trait;
pub mod registry;
pub mod selector;
pub mod stream;
pub mod types;

pub use driver::{GenerationOutcome, GenerationSlot, InferenceDriver};
pub use error::{ProviderError, Result};
pub use provider_trait::LlmProvider;
pub use selector::{select_profile, SelectorState};
pub use stream::StreamEvent;
pub use types::{ChatHints, ChatMessage, ChatRequest, ChatResponse};
