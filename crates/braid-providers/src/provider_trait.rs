use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::stream::StreamEvent;
use crate::types::{ChatRequest, ChatResponse};

/// Common interface for all upstream LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name, for logging and error messages.
    fn name(&self) -> &str;

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Stream response events through a channel. The default falls back to
    /// non-streaming `send`, emitting a single `TextDelta` then `Done`.
    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let resp = self.send(req).await?;
        let text = braid_protocol::ContentBlock::to_plain_text(&resp.content_blocks);
        let _ = tx
            .send(StreamEvent::TextDelta {
                text,
                content_blocks: Some(resp.content_blocks),
            })
            .await;
        let _ = tx
            .send(StreamEvent::Done {
                model: resp.model,
                tokens_in: resp.tokens_in,
                tokens_out: resp.tokens_out,
                stop_reason: resp.stop_reason,
                thought_signature: resp.thought_signature,
            })
            .await;
        Ok(())
    }
}
