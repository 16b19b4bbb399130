use braid_tree::RenderedMessage;

/// Conservative characters-per-token approximation (§4.5 "Token estimation").
/// Deterministic by design — downstream pricing reconciles against
/// provider-reported counts, this estimator only drives window decisions.
const CHARS_PER_TOKEN: usize = 4;

pub fn estimate_text_tokens(text: &str) -> u64 {
    let chars = text.chars().count();
    ((chars + CHARS_PER_TOKEN - 1) / CHARS_PER_TOKEN) as u64
}

pub fn estimate_message_tokens(message: &RenderedMessage) -> u64 {
    let text = braid_protocol::ContentBlock::to_plain_text(&message.content_blocks);
    estimate_text_tokens(&text)
}

pub fn estimate_total_tokens(messages: &[RenderedMessage]) -> u64 {
    messages.iter().map(estimate_message_tokens).sum()
}
