use serde::{Deserialize, Serialize};

use crate::content::ContentBlock;

/// Client → server frames (§6.3). All frames carry `type` and
/// `conversationId`; message-targeted frames carry `messageId` and
/// optionally `branchId`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    Chat {
        conversation_id: String,
        #[serde(default)]
        parent_branch_id: Option<String>,
        #[serde(default)]
        content_blocks: Vec<ContentBlock>,
    },
    Regenerate {
        conversation_id: String,
        message_id: String,
    },
    Edit {
        conversation_id: String,
        message_id: String,
        #[serde(default)]
        content_blocks: Vec<ContentBlock>,
    },
    Continue {
        conversation_id: String,
        message_id: String,
    },
    Cancel {
        conversation_id: String,
    },
    Join {
        conversation_id: String,
    },
    Leave {
        conversation_id: String,
    },
    SetActiveBranch {
        conversation_id: String,
        message_id: String,
        branch_id: String,
    },
}

impl ClientFrame {
    pub fn conversation_id(&self) -> &str {
        match self {
            ClientFrame::Chat { conversation_id, .. }
            | ClientFrame::Regenerate { conversation_id, .. }
            | ClientFrame::Edit { conversation_id, .. }
            | ClientFrame::Continue { conversation_id, .. }
            | ClientFrame::Cancel { conversation_id }
            | ClientFrame::Join { conversation_id }
            | ClientFrame::Leave { conversation_id }
            | ClientFrame::SetActiveBranch { conversation_id, .. } => conversation_id,
        }
    }
}

/// Server → client frames (§6.3 and room-internal streaming protocol of
/// §4.6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    MessageCreated {
        message_id: String,
        branch_id: String,
        order: i64,
        parent_branch_id: String,
        role: String,
        content_blocks: Vec<ContentBlock>,
    },
    MessageEdited {
        message_id: String,
        branch_id: String,
        content_blocks: Vec<ContentBlock>,
    },
    Stream {
        message_id: String,
        branch_id: String,
        chunk: String,
        is_complete: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_blocks: Option<Vec<ContentBlock>>,
    },
    UserJoined {
        user_id: String,
    },
    UserLeft {
        user_id: String,
    },
    AiGenerating {
        message_id: String,
        user_id: String,
    },
    AiFinished {
        message_id: String,
    },
    Error {
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        suggestion: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frame_parses_set_active_branch() {
        let raw = r#"{"type":"set_active_branch","conversationId":"c1","messageId":"m1","branchId":"b1"}"#;
        let frame: ClientFrame = serde_json::from_str(raw).unwrap();
        assert_eq!(
            frame,
            ClientFrame::SetActiveBranch {
                conversation_id: "c1".to_string(),
                message_id: "m1".to_string(),
                branch_id: "b1".to_string(),
            }
        );
        assert_eq!(frame.conversation_id(), "c1");
    }

    #[test]
    fn server_frame_error_serializes_optional_suggestion() {
        let frame = ServerFrame::Error {
            code: "BUSY".to_string(),
            message: "generation in progress".to_string(),
            suggestion: None,
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(!json.contains("suggestion"));
    }
}
