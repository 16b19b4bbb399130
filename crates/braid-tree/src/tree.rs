use std::collections::HashMap;

use braid_core::{BranchId, ConversationId, MessageId, ParticipantId, Timestamp};
use braid_protocol::{ContentBlock, EventKind};
use tracing::warn;

use crate::entity::{Branch, Message, Role};
use crate::error::{Result, TreeError};

/// One rendered entry of the active path (§4.3 "walking the active path").
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub message_id: MessageId,
    pub branch_id: BranchId,
    pub order: i64,
    pub role: Role,
    pub content_blocks: Vec<ContentBlock>,
    pub participant_id: Option<ParticipantId>,
}

/// Branch-tree + message ordering for one conversation (§4.3).
///
/// Branches live in an arena (`Vec<Branch>` + `BranchId → index`) rather
/// than as a graph of cross-references, per the cyclic-reference-hazards
/// design note — a branch only ever points at its parent by ID, never by
/// pointer.
#[derive(Debug)]
pub struct MessageTree {
    conversation_id: ConversationId,
    branches: Vec<Branch>,
    branch_index: HashMap<BranchId, usize>,
    branch_owner: HashMap<BranchId, MessageId>,
    messages: Vec<Message>,
    message_index: HashMap<MessageId, usize>,
}

impl MessageTree {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            branches: Vec::new(),
            branch_index: HashMap::new(),
            branch_owner: HashMap::new(),
            messages: Vec::new(),
            message_index: HashMap::new(),
        }
    }

    pub fn message(&self, id: &MessageId) -> Option<&Message> {
        self.message_index.get(id).map(|&i| &self.messages[i])
    }

    pub fn branch(&self, id: &BranchId) -> Option<&Branch> {
        self.branch_index.get(id).map(|&i| &self.branches[i])
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    fn max_order(&self) -> i64 {
        self.messages.iter().map(|m| m.order).max().unwrap_or(-1)
    }

    /// `createMessage` (§4.3): plans a `message_created` event. Does not
    /// mutate state — callers append the event, then `apply` it.
    pub fn plan_create_message(
        &self,
        role: Role,
        content_blocks: Vec<ContentBlock>,
        parent: Option<BranchId>,
    ) -> Result<(MessageId, BranchId, EventKind)> {
        let parent_branch_id = parent.unwrap_or_else(BranchId::root);
        if !parent_branch_id.is_root() && !self.branch_index.contains_key(&parent_branch_id) {
            return Err(TreeError::InvalidParent(parent_branch_id.to_string()));
        }
        let message_id = MessageId::new();
        let branch_id = BranchId::new();
        let order = self.max_order() + 1;
        let event = EventKind::MessageCreated {
            message_id: message_id.to_string(),
            order,
            branch_id: branch_id.to_string(),
            parent_branch_id: parent_branch_id.to_string(),
            role: role_str(&role).to_string(),
            content_blocks,
            participant_id: None,
        };
        Ok((message_id, branch_id, event))
    }

    /// `editMessage` (§4.3): a new branch with the same parent as the
    /// current active branch, followed by `active_branch_changed`.
    pub fn plan_edit_message(
        &self,
        message_id: &MessageId,
        content_blocks: Vec<ContentBlock>,
    ) -> Result<(BranchId, Vec<EventKind>)> {
        let message = self
            .message(message_id)
            .ok_or_else(|| TreeError::MessageNotFound(message_id.to_string()))?;
        let active = self
            .branch(&message.active_branch_id)
            .ok_or_else(|| TreeError::BranchNotFound(message.active_branch_id.to_string()))?;
        let new_branch_id = BranchId::new();
        let events = vec![
            EventKind::MessageBranchAdded {
                message_id: message_id.to_string(),
                branch_id: new_branch_id.to_string(),
                parent_branch_id: active.parent_branch_id.to_string(),
                role: role_str(&active.role).to_string(),
                content_blocks,
                participant_id: active.participant_id.as_ref().map(|p| p.to_string()),
                model: active.model.clone(),
            },
            EventKind::ActiveBranchChanged {
                message_id: message_id.to_string(),
                branch_id: new_branch_id.to_string(),
            },
        ];
        Ok((new_branch_id, events))
    }

    /// `regenerate` (§4.3): same as edit, with empty content — a later
    /// streaming completion fills the branch in.
    pub fn plan_regenerate(&self, message_id: &MessageId) -> Result<(BranchId, Vec<EventKind>)> {
        self.plan_edit_message(message_id, Vec::new())
    }

    /// `continue` (§4.3, `ClientFrame::Continue`): resumes generation onto
    /// `message_id`'s existing active branch instead of starting a fresh
    /// empty one — distinct from `regenerate`, which discards the active
    /// branch's content. Plans no events; there is nothing to fold until the
    /// resumed generation's `message_branch_updated` fill lands. Returns the
    /// branch to keep writing into and the content already on it, so the
    /// caller appends rather than replaces.
    pub fn plan_continue(&self, message_id: &MessageId) -> Result<(BranchId, Vec<ContentBlock>)> {
        let message = self
            .message(message_id)
            .ok_or_else(|| TreeError::MessageNotFound(message_id.to_string()))?;
        let active = self
            .branch(&message.active_branch_id)
            .ok_or_else(|| TreeError::BranchNotFound(message.active_branch_id.to_string()))?;
        Ok((active.id.clone(), active.content_blocks.clone()))
    }

    /// `setActiveBranch` (§4.3). On an unknown branch ID, the repair policy
    /// promotes the branch with the largest `createdAt` instead of failing.
    pub fn plan_set_active_branch(
        &self,
        message_id: &MessageId,
        branch_id: &BranchId,
    ) -> Result<EventKind> {
        let message = self
            .message(message_id)
            .ok_or_else(|| TreeError::MessageNotFound(message_id.to_string()))?;

        let target = if message.branches.contains(branch_id) {
            branch_id.clone()
        } else {
            self.repair_active_branch(message)?
        };

        Ok(EventKind::ActiveBranchChanged {
            message_id: message_id.to_string(),
            branch_id: target.to_string(),
        })
    }

    fn repair_active_branch(&self, message: &Message) -> Result<BranchId> {
        message
            .branches
            .iter()
            .filter_map(|id| self.branch(id))
            .max_by_key(|b| b.created_at)
            .map(|b| b.id.clone())
            .ok_or_else(|| TreeError::MessageNotFound(message.id.to_string()))
    }

    /// `splitMessage` (§4.3): splits the active branch of `message_id` at
    /// character `offset` into two contiguous messages, preserving
    /// `parentBranchId` chains and re-establishing I4/I5 by reassigning
    /// `order` on every message at or after the split point.
    ///
    /// Always emits `message_order_changed` for every reordered message —
    /// this is now a hard contract (§9 Q3), not an optional fix-up.
    pub fn plan_split_message(
        &self,
        message_id: &MessageId,
        offset: usize,
    ) -> Result<(MessageId, Vec<EventKind>)> {
        let message = self
            .message(message_id)
            .ok_or_else(|| TreeError::MessageNotFound(message_id.to_string()))?;
        let active = self
            .branch(&message.active_branch_id)
            .ok_or_else(|| TreeError::BranchNotFound(message.active_branch_id.to_string()))?;
        let text = active.plain_text();
        if offset == 0 || offset >= text.chars().count() {
            return Err(TreeError::InvalidSplitOffset {
                branch: active.id.to_string(),
                offset,
            });
        }
        let (head, tail): (String, String) = {
            let chars: Vec<char> = text.chars().collect();
            (
                chars[..offset].iter().collect(),
                chars[offset..].iter().collect(),
            )
        };

        let second_message_id = MessageId::new();
        let second_branch_id = BranchId::new();
        let split_order = message.order;

        let mut events = vec![
            // First half keeps the original message/branch IDs and the
            // original parent, but with truncated content.
            EventKind::MessageBranchUpdated {
                message_id: message_id.to_string(),
                branch_id: active.id.to_string(),
                content_blocks: ContentBlock::from_legacy_content(&head),
                thought_signature: None,
                debug_request_blob_id: None,
                debug_response_blob_id: None,
                debug_request: None,
                debug_response: None,
            },
            EventKind::MessageCreated {
                message_id: second_message_id.to_string(),
                order: split_order + 1,
                branch_id: second_branch_id.to_string(),
                parent_branch_id: active.id.to_string(),
                role: role_str(&active.role).to_string(),
                content_blocks: ContentBlock::from_legacy_content(&tail),
                participant_id: active.participant_id.as_ref().map(|p| p.to_string()),
            },
        ];

        // Every message that previously sat at or after split_order + 1 must
        // shift up by one to make room, re-establishing I4/I5.
        for existing in &self.messages {
            if existing.id != *message_id && existing.order >= split_order + 1 {
                events.push(EventKind::MessageOrderChanged {
                    message_id: existing.id.to_string(),
                    order: existing.order + 1,
                });
            }
        }

        Ok((second_message_id, events))
    }

    /// `deleteMessage` (§4.3): removes the message and emits `message_deleted`.
    /// Any branch whose parent resolves into the deleted message becomes an
    /// orphan and is re-rooted to `"root"` as part of applying that single
    /// event — there is no separate reparent event in the closed kind set.
    pub fn plan_delete_message(&self, message_id: &MessageId) -> Result<Vec<EventKind>> {
        self.message(message_id)
            .ok_or_else(|| TreeError::MessageNotFound(message_id.to_string()))?;

        Ok(vec![EventKind::MessageDeleted {
            message_id: message_id.to_string(),
        }])
    }

    /// Follow `parentBranchId` upward from `from_branch_id` until `"root"`,
    /// collecting owning messages, then return them in transcript order
    /// (root → leaf). Iterative — depth is caller-controlled, never
    /// recursive. A missing parent terminates the walk and is logged, not
    /// thrown.
    pub fn walk_active_path(&self, from_branch_id: &BranchId) -> Vec<RenderedMessage> {
        let mut collected = Vec::new();
        let mut current = from_branch_id.clone();
        while !current.is_root() {
            let Some(branch) = self.branch(&current) else {
                warn!(branch_id = %current, "walk_active_path: missing parent, terminating");
                break;
            };
            let Some(owner) = self.branch_owner.get(&branch.id) else {
                warn!(branch_id = %current, "walk_active_path: branch has no owning message");
                break;
            };
            let Some(message) = self.message(owner) else {
                warn!(message_id = %owner, "walk_active_path: owning message missing");
                break;
            };
            collected.push(RenderedMessage {
                message_id: message.id.clone(),
                branch_id: branch.id.clone(),
                order: message.order,
                role: branch.role.clone(),
                content_blocks: branch.content_blocks.clone(),
                participant_id: branch.participant_id.clone(),
            });
            current = branch.parent_branch_id.clone();
        }
        collected.reverse();
        collected
    }

    // --- replay / apply ---

    /// Fold one event into the tree. Used both for replay and for live
    /// application after a successful durable append. Invalid references
    /// (I3 violations) are healed rather than propagated, per §4.3 "Failure
    /// semantics".
    pub fn apply(&mut self, event: &EventKind) {
        match event {
            EventKind::MessageCreated {
                message_id,
                order,
                branch_id,
                parent_branch_id,
                role,
                content_blocks,
                participant_id,
            } => {
                let branch_id = BranchId::from(branch_id.as_str());
                let message_id = MessageId::from(message_id.as_str());
                let branch = Branch {
                    id: branch_id.clone(),
                    parent_branch_id: BranchId::from(parent_branch_id.as_str()),
                    role: parse_role(role),
                    content_blocks: content_blocks.clone(),
                    attachments: Vec::new(),
                    participant_id: participant_id.as_deref().map(ParticipantId::from),
                    model: None,
                    created_at: Timestamp::now(),
                    thought_signature: None,
                };
                self.insert_branch(branch, message_id.clone());
                let message = Message {
                    id: message_id.clone(),
                    conversation_id: self.conversation_id.clone(),
                    order: *order,
                    branches: vec![branch_id.clone()],
                    active_branch_id: branch_id,
                };
                self.insert_message(message);
            }
            EventKind::MessageBranchAdded {
                message_id,
                branch_id,
                parent_branch_id,
                role,
                content_blocks,
                participant_id,
                model,
            } => {
                let message_id = MessageId::from(message_id.as_str());
                let branch_id = BranchId::from(branch_id.as_str());
                let branch = Branch {
                    id: branch_id.clone(),
                    parent_branch_id: BranchId::from(parent_branch_id.as_str()),
                    role: parse_role(role),
                    content_blocks: content_blocks.clone(),
                    attachments: Vec::new(),
                    participant_id: participant_id.as_deref().map(ParticipantId::from),
                    model: model.clone(),
                    created_at: Timestamp::now(),
                    thought_signature: None,
                };
                self.insert_branch(branch, message_id.clone());
                if let Some(idx) = self.message_index.get(&message_id).copied() {
                    self.messages[idx].branches.push(branch_id);
                }
            }
            EventKind::MessageBranchUpdated {
                message_id: _,
                branch_id,
                content_blocks,
                thought_signature,
                ..
            } => {
                let branch_id = BranchId::from(branch_id.as_str());
                if let Some(idx) = self.branch_index.get(&branch_id).copied() {
                    self.branches[idx].content_blocks = content_blocks.clone();
                    self.branches[idx].thought_signature = thought_signature.clone();
                }
            }
            EventKind::ActiveBranchChanged {
                message_id,
                branch_id,
            } => {
                let message_id = MessageId::from(message_id.as_str());
                let branch_id = BranchId::from(branch_id.as_str());
                if let Some(idx) = self.message_index.get(&message_id).copied() {
                    if self.messages[idx].branches.contains(&branch_id) {
                        self.messages[idx].active_branch_id = branch_id;
                    } else {
                        warn!(
                            %message_id,
                            %branch_id,
                            "apply: active_branch_changed referenced a branch not in the message, ignoring"
                        );
                    }
                }
            }
            EventKind::MessageOrderChanged { message_id, order } => {
                let message_id = MessageId::from(message_id.as_str());
                if let Some(idx) = self.message_index.get(&message_id).copied() {
                    self.messages[idx].order = *order;
                }
            }
            EventKind::MessageDeleted { message_id } => {
                let message_id = MessageId::from(message_id.as_str());
                self.remove_message(&message_id);
            }
            _ => {}
        }
        self.heal_active_branches();
    }

    fn insert_branch(&mut self, branch: Branch, owner: MessageId) {
        let id = branch.id.clone();
        self.branch_index.insert(id.clone(), self.branches.len());
        self.branch_owner.insert(id, owner);
        self.branches.push(branch);
    }

    fn insert_message(&mut self, message: Message) {
        let id = message.id.clone();
        self.message_index.insert(id, self.messages.len());
        self.messages.push(message);
    }

    fn remove_message(&mut self, message_id: &MessageId) {
        if let Some(idx) = self.message_index.remove(message_id) {
            let removed = self.messages.remove(idx);
            for branch_id in &removed.branches {
                self.branch_owner.remove(branch_id);
            }
            // reindex — swap_remove-free path keeps replay order stable.
            for (_, v) in self.message_index.iter_mut() {
                if *v > idx {
                    *v -= 1;
                }
            }
            // Branches orphaned by deleting their parent message re-root to
            // "root" as a direct side effect of this apply, not a separate
            // emitted event.
            for branch in &mut self.branches {
                if removed.branches.contains(&branch.parent_branch_id) {
                    branch.parent_branch_id = BranchId::root();
                }
            }
        }
    }

    /// I3 repair pass: any message whose `active_branch_id` no longer
    /// resolves within its own branch list is healed by promoting the
    /// most-recently-created branch.
    fn heal_active_branches(&mut self) {
        for i in 0..self.messages.len() {
            let active = self.messages[i].active_branch_id.clone();
            if self.messages[i].branches.contains(&active) {
                continue;
            }
            if let Some(repaired) = self.messages[i]
                .branches
                .iter()
                .filter_map(|id| self.branch(id))
                .max_by_key(|b| b.created_at)
                .map(|b| b.id.clone())
            {
                warn!(message_id = %self.messages[i].id, "heal_active_branches: repairing invalid activeBranchId");
                self.messages[i].active_branch_id = repaired;
            }
        }
    }
}

fn role_str(role: &Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    }
}

fn parse_role(s: &str) -> Role {
    match s {
        "assistant" => Role::Assistant,
        "system" => Role::System,
        _ => Role::User,
    }
}
