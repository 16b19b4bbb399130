use std::sync::Arc;

use braid_core::ids::{ConversationId, MessageId};
use braid_providers::GenerationSlot;

use crate::room::RoomManager;

/// Bridges [`RoomManager`]'s per-conversation generation exclusivity (I7) to
/// `braid-providers`' transport-agnostic [`GenerationSlot`] trait, so
/// `braid-providers` never depends on this crate.
pub struct ConversationSlot {
    room: Arc<RoomManager>,
    conversation_id: ConversationId,
    message_id: MessageId,
}

impl ConversationSlot {
    pub fn new(room: Arc<RoomManager>, conversation_id: ConversationId, message_id: MessageId) -> Self {
        Self { room, conversation_id, message_id }
    }
}

impl GenerationSlot for ConversationSlot {
    fn acquire(&self) -> bool {
        self.room.start_generation(&self.conversation_id, &self.message_id)
    }

    fn release(&self) {
        self.room.end_generation(&self.conversation_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_slot_for_same_conversation_is_refused_until_first_releases() {
        let room = Arc::new(RoomManager::new());
        let conv = ConversationId::new();
        let slot_a = ConversationSlot::new(room.clone(), conv.clone(), MessageId::new());
        let slot_b = ConversationSlot::new(room.clone(), conv.clone(), MessageId::new());

        assert!(slot_a.acquire());
        assert!(!slot_b.acquire());

        slot_a.release();
        assert!(slot_b.acquire());
    }
}
