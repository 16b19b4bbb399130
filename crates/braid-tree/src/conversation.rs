use braid_core::{ConversationId, ParticipantId};
use braid_protocol::{EventEnvelope, EventKind};

use crate::entity::{Conversation, Participant};
use crate::tree::MessageTree;

/// Counters produced while folding a conversation's logs into memory
/// (§4.2 "observability at startup").
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub applied_events: u64,
    /// Lines that failed to parse or carried an unrecognized `type` tag —
    /// surfaced by `FileEventLog::load_with_stats`, threaded through here so
    /// callers see one number for "how much of this log we could not trust".
    pub skipped_lines: u64,
}

/// One conversation's full in-memory projection: metadata, participants, and
/// the branch tree, folded from its user-log and conversation-log events.
#[derive(Debug)]
pub struct ConversationModel {
    pub conversation: Conversation,
    pub participants: Vec<Participant>,
    pub tree: MessageTree,
}

impl ConversationModel {
    /// Seed a fresh, empty model — used when a `conversation_created` event
    /// is about to be applied for the first time.
    pub fn new(conversation: Conversation) -> Self {
        let tree = MessageTree::new(conversation.id.clone());
        Self {
            conversation,
            participants: Vec::new(),
            tree,
        }
    }

    /// Fold a conversation's events (already filtered to this conversation's
    /// ID from the owning user log, plus its own conversation log) into a
    /// model, starting from an already-known `Conversation` record. Events
    /// belonging to other conversations or unrelated kinds are ignored.
    ///
    /// `skipped_lines` is passed through from whatever loaded the underlying
    /// logs (`FileEventLog::load_with_stats`) so callers get one combined
    /// stats struct instead of re-deriving it.
    pub fn replay(
        conversation: Conversation,
        user_log_events: &[EventEnvelope],
        conversation_log_events: &[EventEnvelope],
        skipped_lines: u64,
    ) -> (Self, ReplayStats) {
        let conversation_id = conversation.id.clone();
        let mut model = Self::new(conversation);
        let mut stats = ReplayStats {
            applied_events: 0,
            skipped_lines,
        };

        for envelope in user_log_events {
            if model.apply_user_event(&envelope.kind, &conversation_id) {
                stats.applied_events += 1;
            }
        }
        for envelope in conversation_log_events {
            model.tree.apply(&envelope.kind);
            stats.applied_events += 1;
        }

        (model, stats)
    }

    /// Applies one user-log event if it pertains to this conversation.
    /// Returns whether it was relevant (used only for stats bookkeeping).
    fn apply_user_event(&mut self, event: &EventKind, conversation_id: &ConversationId) -> bool {
        match event {
            EventKind::ConversationUpdated {
                conversation_id: cid,
                title,
                system_prompt,
                default_model_id,
                context_config,
            } if cid == conversation_id.as_str() => {
                if let Some(title) = title {
                    self.conversation.title = title.clone();
                }
                if system_prompt.is_some() {
                    self.conversation.system_prompt = system_prompt.clone();
                }
                if default_model_id.is_some() {
                    self.conversation.default_model_id = default_model_id.clone();
                }
                if context_config.is_some() {
                    self.conversation.context_config = context_config.clone();
                }
                true
            }
            EventKind::ConversationArchived {
                conversation_id: cid,
                archived_at,
            } if cid == conversation_id.as_str() => {
                self.conversation.archived_at = braid_core::Timestamp::from_rfc3339(archived_at);
                true
            }
            EventKind::ParticipantCreated {
                participant_id,
                conversation_id: cid,
                name,
                kind,
                model_id,
                system_prompt,
                settings,
            } if cid == conversation_id.as_str() => {
                self.participants.push(Participant {
                    id: ParticipantId::from(participant_id.as_str()),
                    conversation_id: conversation_id.clone(),
                    name: name.clone(),
                    kind: parse_participant_kind(kind),
                    model_id: model_id.clone(),
                    system_prompt: system_prompt.clone(),
                    settings: settings.clone(),
                    context_management: None,
                    is_active: true,
                });
                true
            }
            EventKind::ParticipantUpdated {
                participant_id,
                changes,
            } => {
                if let Some(p) = self
                    .participants
                    .iter_mut()
                    .find(|p| p.id.as_str() == participant_id)
                {
                    if let Some(name) = changes.get("name").and_then(|v| v.as_str()) {
                        p.name = name.to_string();
                    }
                    if let Some(model_id) = changes.get("modelId").and_then(|v| v.as_str()) {
                        p.model_id = Some(model_id.to_string());
                    }
                    return true;
                }
                false
            }
            EventKind::ParticipantDeleted { participant_id } => {
                let before = self.participants.len();
                self.participants.retain(|p| p.id.as_str() != participant_id);
                self.participants.len() != before
            }
            _ => false,
        }
    }
}

fn parse_participant_kind(s: &str) -> crate::entity::ParticipantKind {
    if s == "assistant" {
        crate::entity::ParticipantKind::Assistant
    } else {
        crate::entity::ParticipantKind::User
    }
}
