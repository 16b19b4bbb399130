pub mod conversation;
pub mod entity;
pub mod error;
pub mod tree;

pub use conversation::{ConversationModel, ReplayStats};
pub use entity::{Branch, Conversation, ConversationFormat, Message, Participant, ParticipantKind, Role};
pub use error::{Result, TreeError};
pub use tree::{MessageTree, RenderedMessage};
