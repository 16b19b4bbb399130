use braid_protocol::ContentBlock;

/// One message handed to a provider (§4.5 prompt emission output, adapted
/// for the wire request shape).
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content_blocks: Vec<ContentBlock>,
}

/// Hints carried alongside the request (mirrors
/// `braid_context::ProviderHints`; duplicated here rather than depended on,
/// so this crate has no reason to know about context-window bookkeeping).
#[derive(Debug, Clone, Default)]
pub struct ChatHints {
    pub cache_anchor_index: Option<usize>,
    pub stop_sequences: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system_prompt: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub hints: ChatHints,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content_blocks: Vec<ContentBlock>,
    pub model: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub stop_reason: String,
    pub thought_signature: Option<String>,
}
