use std::collections::HashMap;

use braid_core::{BranchId, ConversationId, MessageId, ParticipantId, Timestamp};
use braid_protocol::ContentBlock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationFormat {
    Standard,
    Prefill,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantKind {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub owner_id: braid_core::UserId,
    pub title: String,
    pub system_prompt: Option<String>,
    pub default_model_id: Option<String>,
    pub format: ConversationFormat,
    pub context_config: Option<serde_json::Value>,
    pub created_at: Timestamp,
    pub archived_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub conversation_id: ConversationId,
    pub name: String,
    pub kind: ParticipantKind,
    pub model_id: Option<String>,
    pub system_prompt: Option<String>,
    pub settings: HashMap<String, serde_json::Value>,
    pub context_management: Option<serde_json::Value>,
    pub is_active: bool,
}

/// A concrete utterance variant (§3.2). Belongs to exactly one `Message`
/// (I2), enforced by the arena that owns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub parent_branch_id: BranchId,
    pub role: Role,
    pub content_blocks: Vec<ContentBlock>,
    pub attachments: Vec<String>,
    pub participant_id: Option<ParticipantId>,
    pub model: Option<String>,
    pub created_at: Timestamp,
    pub thought_signature: Option<String>,
}

impl Branch {
    pub fn plain_text(&self) -> String {
        ContentBlock::to_plain_text(&self.content_blocks)
    }
}

/// A node in the conversation tree (§3.2). `order` is a monotonically
/// assigned total order used only for default rendering (§4.3); the actual
/// tree structure lives in `Branch::parent_branch_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub order: i64,
    pub branches: Vec<BranchId>,
    pub active_branch_id: BranchId,
}
