pub mod content;
pub mod events;
pub mod frames;

pub use content::{CacheControl, ContentBlock};
pub use events::{EventEnvelope, EventKind, LogCategory};
pub use frames::{ClientFrame, ServerFrame};
