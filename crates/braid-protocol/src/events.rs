use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::content::ContentBlock;

/// Which of the three log categories (§4.1) an event kind belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    Main,
    User,
    Conversation,
}

/// The closed event kind set (§6.1). Internally tagged as `type`/`data` so an
/// `EventEnvelope` serializes to exactly `{ "timestamp": ..., "type": "...",
/// "data": { ... } }` on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventKind {
    // --- main log ---
    UserCreated {
        user_id: String,
        email: Option<String>,
        display_name: Option<String>,
    },
    UserUpdated {
        user_id: String,
        #[serde(default)]
        changes: HashMap<String, Value>,
    },
    UserEmailVerified {
        user_id: String,
    },
    PasswordReset {
        user_id: String,
    },
    ApiKeyCreated {
        user_id: String,
        key_id: String,
        #[serde(default)]
        label: Option<String>,
    },
    ApiKeyRevoked {
        user_id: String,
        key_id: String,
    },
    ShareCreated {
        share_id: String,
        conversation_id: String,
        created_by: String,
    },
    ShareDeleted {
        share_id: String,
    },
    ShareViewed {
        share_id: String,
        viewer_user_id: Option<String>,
    },
    InviteCreated {
        code: String,
        creator_user_id: String,
        amount: i64,
        currency: String,
        #[serde(default)]
        expires_at: Option<String>,
        #[serde(default)]
        max_uses: Option<u32>,
    },
    InviteClaimed {
        code: String,
        claimer_user_id: String,
    },
    GrantInfo {
        entry_id: String,
        grant_type: String,
        amount: i64,
        currency: String,
        #[serde(default)]
        from_user_id: Option<String>,
        #[serde(default)]
        to_user_id: Option<String>,
        #[serde(default)]
        reason: Option<String>,
        #[serde(default)]
        details: Option<Value>,
    },
    GrantCapability {
        capability_id: String,
        user_id: String,
        action: String,
        capability: String,
        #[serde(default)]
        expires_at: Option<String>,
    },

    // --- user log ---
    ConversationCreated {
        conversation_id: String,
        owner_id: String,
        title: String,
        #[serde(default)]
        system_prompt: Option<String>,
        #[serde(default)]
        default_model_id: Option<String>,
        #[serde(default)]
        format: String,
    },
    ConversationUpdated {
        conversation_id: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        system_prompt: Option<String>,
        #[serde(default)]
        default_model_id: Option<String>,
        #[serde(default)]
        context_config: Option<Value>,
    },
    ConversationArchived {
        conversation_id: String,
        archived_at: String,
    },
    ParticipantCreated {
        participant_id: String,
        conversation_id: String,
        name: String,
        kind: String,
        #[serde(default)]
        model_id: Option<String>,
        #[serde(default)]
        system_prompt: Option<String>,
        #[serde(default)]
        settings: HashMap<String, Value>,
    },
    ParticipantUpdated {
        participant_id: String,
        #[serde(default)]
        changes: HashMap<String, Value>,
    },
    ParticipantDeleted {
        participant_id: String,
    },
    CollabShareCreated {
        share_id: String,
        conversation_id: String,
        user_id: String,
    },
    CollabShareUpdated {
        share_id: String,
        #[serde(default)]
        changes: HashMap<String, Value>,
    },
    CollabShareRevoked {
        share_id: String,
    },
    MetricsAdded {
        conversation_id: String,
        message_id: String,
        branch_id: String,
        tokens_in: u64,
        tokens_out: u64,
        #[serde(default)]
        cost: Option<f64>,
        #[serde(default)]
        currency: Option<String>,
        #[serde(default)]
        provider_profile_id: Option<String>,
    },

    // --- conversation log ---
    MessageCreated {
        message_id: String,
        order: i64,
        branch_id: String,
        parent_branch_id: String,
        role: String,
        #[serde(default)]
        content_blocks: Vec<ContentBlock>,
        #[serde(default)]
        participant_id: Option<String>,
    },
    MessageBranchAdded {
        message_id: String,
        branch_id: String,
        parent_branch_id: String,
        role: String,
        #[serde(default)]
        content_blocks: Vec<ContentBlock>,
        #[serde(default)]
        participant_id: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
    MessageBranchUpdated {
        message_id: String,
        branch_id: String,
        #[serde(default)]
        content_blocks: Vec<ContentBlock>,
        #[serde(default)]
        thought_signature: Option<String>,
        #[serde(default)]
        debug_request_blob_id: Option<String>,
        #[serde(default)]
        debug_response_blob_id: Option<String>,
        #[serde(default)]
        debug_request: Option<Value>,
        #[serde(default)]
        debug_response: Option<Value>,
    },
    ActiveBranchChanged {
        message_id: String,
        branch_id: String,
    },
    MessageOrderChanged {
        message_id: String,
        order: i64,
    },
    MessageDeleted {
        message_id: String,
    },
}

impl EventKind {
    pub fn category(&self) -> LogCategory {
        use EventKind::*;
        match self {
            UserCreated { .. }
            | UserUpdated { .. }
            | UserEmailVerified { .. }
            | PasswordReset { .. }
            | ApiKeyCreated { .. }
            | ApiKeyRevoked { .. }
            | ShareCreated { .. }
            | ShareDeleted { .. }
            | ShareViewed { .. }
            | InviteCreated { .. }
            | InviteClaimed { .. }
            | GrantInfo { .. }
            | GrantCapability { .. } => LogCategory::Main,

            ConversationCreated { .. }
            | ConversationUpdated { .. }
            | ConversationArchived { .. }
            | ParticipantCreated { .. }
            | ParticipantUpdated { .. }
            | ParticipantDeleted { .. }
            | CollabShareCreated { .. }
            | CollabShareUpdated { .. }
            | CollabShareRevoked { .. }
            | MetricsAdded { .. } => LogCategory::User,

            MessageCreated { .. }
            | MessageBranchAdded { .. }
            | MessageBranchUpdated { .. }
            | ActiveBranchChanged { .. }
            | MessageOrderChanged { .. }
            | MessageDeleted { .. } => LogCategory::Conversation,
        }
    }

    /// Event kinds the compactor treats as reconstructable from replayed
    /// state and therefore strips (§4.1, §4.9).
    pub fn is_reconstructable(&self) -> bool {
        matches!(
            self,
            EventKind::ActiveBranchChanged { .. } | EventKind::MessageOrderChanged { .. }
        )
    }

    /// The wire tag string, matching the `type` field used on disk.
    pub fn kind_str(&self) -> &'static str {
        use EventKind::*;
        match self {
            UserCreated { .. } => "user_created",
            UserUpdated { .. } => "user_updated",
            UserEmailVerified { .. } => "user_email_verified",
            PasswordReset { .. } => "password_reset",
            ApiKeyCreated { .. } => "api_key_created",
            ApiKeyRevoked { .. } => "api_key_revoked",
            ShareCreated { .. } => "share_created",
            ShareDeleted { .. } => "share_deleted",
            ShareViewed { .. } => "share_viewed",
            InviteCreated { .. } => "invite_created",
            InviteClaimed { .. } => "invite_claimed",
            GrantInfo { .. } => "grant_info",
            GrantCapability { .. } => "grant_capability",
            ConversationCreated { .. } => "conversation_created",
            ConversationUpdated { .. } => "conversation_updated",
            ConversationArchived { .. } => "conversation_archived",
            ParticipantCreated { .. } => "participant_created",
            ParticipantUpdated { .. } => "participant_updated",
            ParticipantDeleted { .. } => "participant_deleted",
            CollabShareCreated { .. } => "collab_share_created",
            CollabShareUpdated { .. } => "collab_share_updated",
            CollabShareRevoked { .. } => "collab_share_revoked",
            MetricsAdded { .. } => "metrics_added",
            MessageCreated { .. } => "message_created",
            MessageBranchAdded { .. } => "message_branch_added",
            MessageBranchUpdated { .. } => "message_branch_updated",
            ActiveBranchChanged { .. } => "active_branch_changed",
            MessageOrderChanged { .. } => "message_order_changed",
            MessageDeleted { .. } => "message_deleted",
        }
    }
}

/// On-disk envelope (§6.2): one JSON object per line, `{ "timestamp": "...",
/// "type": "...", "data": { ... } }`. `kind` is `#[serde(flatten)]`ed so its
/// internally-tagged `type`/`data` fields sit next to `timestamp` at the top
/// level instead of nesting under a `kind` key. Unknown top-level fields are
/// tolerated on read and dropped on write — ordinary serde struct behavior,
/// not something flatten changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub timestamp: braid_core::Timestamp,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl EventEnvelope {
    pub fn new(kind: EventKind) -> Self {
        Self {
            timestamp: braid_core::Timestamp::now(),
            kind,
        }
    }

    pub fn at(timestamp: braid_core::Timestamp, kind: EventKind) -> Self {
        Self { timestamp, kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrips_through_json() {
        let env = EventEnvelope::new(EventKind::MessageDeleted {
            message_id: "m1".to_string(),
        });
        let line = serde_json::to_string(&env).unwrap();
        assert!(line.contains("\"type\":\"message_deleted\""));
        let back: EventEnvelope = serde_json::from_str(&line).unwrap();
        assert_eq!(back.kind, env.kind);
    }

    #[test]
    fn unknown_top_level_field_tolerated_on_read() {
        let line = r#"{"timestamp":"2024-01-01T00:00:00.000Z","type":"message_deleted","data":{"message_id":"m1"},"legacyField":"x"}"#;
        let env: EventEnvelope = serde_json::from_str(line).unwrap();
        assert_eq!(
            env.kind,
            EventKind::MessageDeleted {
                message_id: "m1".to_string()
            }
        );
    }

    #[test]
    fn category_routing_matches_spec_grouping() {
        assert_eq!(
            EventKind::PasswordReset {
                user_id: "u".into()
            }
            .category(),
            LogCategory::Main
        );
        assert_eq!(
            EventKind::MetricsAdded {
                conversation_id: "c".into(),
                message_id: "m".into(),
                branch_id: "b".into(),
                tokens_in: 0,
                tokens_out: 0,
                cost: None,
                currency: None,
                provider_profile_id: None,
            }
            .category(),
            LogCategory::User
        );
        assert_eq!(
            EventKind::MessageDeleted {
                message_id: "m".into()
            }
            .category(),
            LogCategory::Conversation
        );
    }

    #[test]
    fn reconstructable_kinds_match_compactor_policy() {
        assert!(EventKind::ActiveBranchChanged {
            message_id: "m".into(),
            branch_id: "b".into()
        }
        .is_reconstructable());
        assert!(!EventKind::MessageDeleted {
            message_id: "m".into()
        }
        .is_reconstructable());
    }
}
