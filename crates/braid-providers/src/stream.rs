use braid_core::UpstreamKind;
use braid_protocol::ContentBlock;

/// Events emitted during streaming inference (§4.6 "streams deltas").
#[derive(Debug, Clone)]
pub enum StreamEvent {
    TextDelta {
        text: String,
        content_blocks: Option<Vec<ContentBlock>>,
    },
    Thinking {
        text: String,
    },
    Done {
        model: String,
        tokens_in: u64,
        tokens_out: u64,
        stop_reason: String,
        thought_signature: Option<String>,
    },
    /// A mid-stream provider failure (§4.6 point 4 / §7). `kind` picks the
    /// message+suggestion pair an `error` frame surfaces to clients.
    Error {
        kind: UpstreamKind,
        message: String,
    },
}
