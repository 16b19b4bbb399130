use serde::{Deserialize, Serialize};

/// Canonical content-block form (§9 "duck-typed messages-in-flight").
///
/// Source code mixes a bare `content` string with a `contentBlocks` array;
/// everywhere in this crate and above, `content` is legacy input mapped to a
/// single `Text` block at the boundary — nothing downstream matches on a
/// string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentBlock {
    Text {
        text: String,
        /// Present when a provider's cache-control marker has been attached
        /// to this block by the context engine (§4.5 cache anchor).
        #[serde(skip_serializing_if = "Option::is_none", default)]
        cache_control: Option<CacheControl>,
    },
    Image {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        blob_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        mime_type: Option<String>,
    },
    Thinking {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        signature: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CacheControl {
    #[serde(rename = "type")]
    pub kind: String,
}

impl CacheControl {
    pub fn ephemeral() -> Self {
        Self {
            kind: "ephemeral".to_string(),
        }
    }
}

impl ContentBlock {
    /// Wrap a legacy plain-string content value as the canonical single
    /// text block.
    pub fn from_legacy_content(content: &str) -> Vec<ContentBlock> {
        vec![ContentBlock::Text {
            text: content.to_string(),
            cache_control: None,
        }]
    }

    /// Best-effort flattening back to a plain string, used wherever a caller
    /// still wants `content` (e.g. token estimation).
    pub fn to_plain_text(blocks: &[ContentBlock]) -> String {
        blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text, .. } => Some(text.as_str()),
                ContentBlock::Thinking { text, .. } => Some(text.as_str()),
                ContentBlock::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
