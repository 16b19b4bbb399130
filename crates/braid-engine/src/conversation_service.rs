use std::sync::{Arc, Mutex};

use braid_core::{BranchId, ConnId, ConversationId, MessageId};
use braid_protocol::{ContentBlock, EventKind, ServerFrame};
use braid_tree::{ConversationModel, Role};

use crate::engine::Engine;
use crate::error::Result;

/// Translates one planned tree event into the wire frame clients should see,
/// if the closed `ServerFrame` set carries one. Events with no wire
/// counterpart (`active_branch_changed`, `message_order_changed`,
/// `message_deleted`) are durable and applied to the tree but not
/// individually broadcast — a client refreshes its view of affected messages
/// from the frames that do go out.
fn event_to_frame(event: &EventKind) -> Option<ServerFrame> {
    match event {
        EventKind::MessageCreated {
            message_id,
            branch_id,
            order,
            parent_branch_id,
            role,
            content_blocks,
            ..
        } => Some(ServerFrame::MessageCreated {
            message_id: message_id.clone(),
            branch_id: branch_id.clone(),
            order: *order,
            parent_branch_id: parent_branch_id.clone(),
            role: role.clone(),
            content_blocks: content_blocks.clone(),
        }),
        EventKind::MessageBranchAdded {
            message_id,
            branch_id,
            content_blocks,
            ..
        } => Some(ServerFrame::MessageEdited {
            message_id: message_id.clone(),
            branch_id: branch_id.clone(),
            content_blocks: content_blocks.clone(),
        }),
        EventKind::MessageBranchUpdated {
            message_id,
            branch_id,
            content_blocks,
            ..
        } => Some(ServerFrame::MessageEdited {
            message_id: message_id.clone(),
            branch_id: branch_id.clone(),
            content_blocks: content_blocks.clone(),
        }),
        _ => None,
    }
}

impl Engine {
    /// Plans `events` against the cached tree, durably applies them, then
    /// broadcasts whichever carry a wire frame. `origin` is excluded from the
    /// broadcast (the frame reaches the originator through its own request
    /// response, not the room fan-out) — pass `None` when there is no live
    /// connection driving the call (e.g. a batch job).
    fn commit_and_broadcast(
        &self,
        conversation_id: &ConversationId,
        model: &Arc<Mutex<ConversationModel>>,
        events: Vec<EventKind>,
        origin: Option<&ConnId>,
    ) -> Result<()> {
        for event in &events {
            if let Some(frame) = event_to_frame(event) {
                self.rooms.broadcast(conversation_id, &frame, origin);
            }
        }
        self.apply_tree_events(conversation_id, model, events)
    }

    /// `chat` (§4.3 `createMessage`, client frame `chat`).
    pub fn send_chat(
        &self,
        conversation_id: &ConversationId,
        model: &Arc<Mutex<ConversationModel>>,
        role: Role,
        content_blocks: Vec<ContentBlock>,
        parent_branch_id: Option<BranchId>,
        origin: Option<&ConnId>,
    ) -> Result<(MessageId, BranchId)> {
        let (message_id, branch_id, event) = {
            let guard = model.lock().unwrap();
            guard.tree.plan_create_message(role, content_blocks, parent_branch_id)?
        };
        self.commit_and_broadcast(conversation_id, model, vec![event], origin)?;
        Ok((message_id, branch_id))
    }

    /// `edit` (§4.3 `editMessage`).
    pub fn edit_message(
        &self,
        conversation_id: &ConversationId,
        model: &Arc<Mutex<ConversationModel>>,
        message_id: &MessageId,
        content_blocks: Vec<ContentBlock>,
        origin: Option<&ConnId>,
    ) -> Result<BranchId> {
        let (branch_id, events) = {
            let guard = model.lock().unwrap();
            guard.tree.plan_edit_message(message_id, content_blocks)?
        };
        self.commit_and_broadcast(conversation_id, model, events, origin)?;
        Ok(branch_id)
    }

    /// `regenerate` (§4.3). Plans an empty-content branch for the caller to
    /// fill in once generation streams a result; see `generation.rs`.
    pub fn regenerate(
        &self,
        conversation_id: &ConversationId,
        model: &Arc<Mutex<ConversationModel>>,
        message_id: &MessageId,
        origin: Option<&ConnId>,
    ) -> Result<BranchId> {
        let (branch_id, events) = {
            let guard = model.lock().unwrap();
            guard.tree.plan_regenerate(message_id)?
        };
        self.commit_and_broadcast(conversation_id, model, events, origin)?;
        Ok(branch_id)
    }

    /// `continue` (§4.3, client frame `continue`). Unlike `regenerate`, plans
    /// no events — there's nothing to broadcast until generation resumes
    /// writing into the existing active branch. Returns that branch and its
    /// current content so the caller's `generate()` call can seed the prompt
    /// and append rather than replace.
    pub fn continue_message(
        &self,
        model: &Arc<Mutex<ConversationModel>>,
        message_id: &MessageId,
    ) -> Result<(BranchId, Vec<ContentBlock>)> {
        let guard = model.lock().unwrap();
        let (branch_id, content) = guard.tree.plan_continue(message_id)?;
        Ok((branch_id, content))
    }

    /// `set_active_branch` (§4.3). On an invalid `branch_id` the tree repairs
    /// to the most-recently-created branch rather than failing.
    pub fn set_active_branch(
        &self,
        conversation_id: &ConversationId,
        model: &Arc<Mutex<ConversationModel>>,
        message_id: &MessageId,
        branch_id: &BranchId,
        origin: Option<&ConnId>,
    ) -> Result<()> {
        let event = {
            let guard = model.lock().unwrap();
            guard.tree.plan_set_active_branch(message_id, branch_id)?
        };
        self.commit_and_broadcast(conversation_id, model, vec![event], origin)?;
        Ok(())
    }

    /// Splits `message_id`'s active branch at character `offset` (§4.3
    /// `splitMessage`), re-establishing ordering across every later message.
    pub fn split_message(
        &self,
        conversation_id: &ConversationId,
        model: &Arc<Mutex<ConversationModel>>,
        message_id: &MessageId,
        offset: usize,
        origin: Option<&ConnId>,
    ) -> Result<MessageId> {
        let (second_id, events) = {
            let guard = model.lock().unwrap();
            guard.tree.plan_split_message(message_id, offset)?
        };
        self.commit_and_broadcast(conversation_id, model, events, origin)?;
        Ok(second_id)
    }

    /// `delete_message` (§4.3). Orphaned children re-root to `"root"` as a
    /// side effect of applying the single `message_deleted` event.
    pub fn delete_message(
        &self,
        conversation_id: &ConversationId,
        model: &Arc<Mutex<ConversationModel>>,
        message_id: &MessageId,
        origin: Option<&ConnId>,
    ) -> Result<()> {
        let events = {
            let guard = model.lock().unwrap();
            guard.tree.plan_delete_message(message_id)?
        };
        self.commit_and_broadcast(conversation_id, model, events, origin)?;
        Ok(())
    }
}
