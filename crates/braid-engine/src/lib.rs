pub mod conversation_service;
pub mod engine;
pub mod error;
pub mod generation;

pub use engine::Engine;
pub use error::{EngineError, Result};
pub use generation::GenerationRequest;
