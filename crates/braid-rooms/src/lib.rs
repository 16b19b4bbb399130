pub mod error;
pub mod room;
pub mod slot;

pub use error::{Result, RoomError};
pub use room::RoomManager;
pub use slot::ConversationSlot;
