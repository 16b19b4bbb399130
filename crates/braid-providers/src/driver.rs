use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use braid_core::UpstreamKind;
use braid_protocol::ContentBlock;

use crate::error::{ProviderError, Result};
use crate::provider_trait::LlmProvider;
use crate::stream::StreamEvent;
use crate::types::ChatRequest;

/// The room's generation slot (I7), as an interface so this crate does not
/// depend on the concrete room manager — a "scoped service passed by
/// interface" per the singletons/globals design note.
pub trait GenerationSlot: Send + Sync {
    /// Attempt to acquire the slot. `false` means one is already in flight.
    fn acquire(&self) -> bool;
    fn release(&self);
}

/// Final outcome of one streamed generation, carrying everything the caller
/// needs to durably persist it.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub content_blocks: Vec<ContentBlock>,
    pub thought_signature: Option<String>,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub model: String,
    pub cancelled: bool,
    /// Set when the stream ended on a mid-stream provider error rather than
    /// a normal `Done`/cancellation — the caller surfaces this as an `error`
    /// frame via `UpstreamKind::message_and_suggestion`.
    pub failed: Option<UpstreamKind>,
}

/// Drives one streamed inference call against a provider, coordinating the
/// room generation slot and cooperative cancellation (§4.6).
pub struct InferenceDriver {
    provider: Arc<dyn LlmProvider>,
    slot: Arc<dyn GenerationSlot>,
}

impl InferenceDriver {
    pub fn new(provider: Arc<dyn LlmProvider>, slot: Arc<dyn GenerationSlot>) -> Self {
        Self { provider, slot }
    }

    /// Runs the request to completion, invoking `on_chunk` for every text
    /// delta. Returns the accumulated outcome to persist. The branch content
    /// is the caller's responsibility to keep in memory during the stream —
    /// this driver only reports deltas, it does not mutate any tree state.
    pub async fn run(
        &self,
        req: &ChatRequest,
        cancel: CancellationToken,
        mut on_chunk: impl FnMut(&str, bool, Option<&[ContentBlock]>),
    ) -> Result<GenerationOutcome> {
        if !self.slot.acquire() {
            return Err(ProviderError::Busy);
        }

        let result = self.run_inner(req, cancel, &mut on_chunk).await;
        self.slot.release();
        result
    }

    async fn run_inner(
        &self,
        req: &ChatRequest,
        cancel: CancellationToken,
        on_chunk: &mut impl FnMut(&str, bool, Option<&[ContentBlock]>),
    ) -> Result<GenerationOutcome> {
        let (tx, mut rx) = mpsc::channel(32);
        let provider = self.provider.clone();
        let req = req.clone();
        let handle = tokio::spawn(async move { provider.send_stream(&req, tx).await });

        let mut accumulated_text = String::new();
        let mut final_blocks: Option<Vec<ContentBlock>> = None;
        let mut tokens_in = 0;
        let mut tokens_out = 0;
        let mut model = req_model(&self.provider);
        let mut thought_signature = None;
        let mut cancelled = false;
        let mut failed = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    cancelled = true;
                    on_chunk(&accumulated_text, true, final_blocks.as_deref());
                    break;
                }
                event = rx.recv() => {
                    match event {
                        Some(StreamEvent::TextDelta { text, content_blocks }) => {
                            accumulated_text.push_str(&text);
                            on_chunk(&text, false, content_blocks.as_deref());
                            if let Some(blocks) = content_blocks {
                                final_blocks = Some(blocks);
                            }
                        }
                        Some(StreamEvent::Thinking { .. }) => {}
                        Some(StreamEvent::Done { model: m, tokens_in: ti, tokens_out: to, thought_signature: sig, .. }) => {
                            model = m;
                            tokens_in = ti;
                            tokens_out = to;
                            thought_signature = sig;
                            on_chunk(&accumulated_text, true, final_blocks.as_deref());
                            break;
                        }
                        Some(StreamEvent::Error { kind, message }) => {
                            warn!(error = %message, kind = ?kind, "inference driver: upstream stream error");
                            failed = Some(kind);
                            on_chunk(&accumulated_text, true, final_blocks.as_deref());
                            break;
                        }
                        None => break,
                    }
                }
            }
        }

        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if !accumulated_text.is_empty() || final_blocks.is_some() => {
                warn!(error = %e, "inference driver: stream ended with error after partial output");
            }
            Ok(Err(e)) => return Err(e),
            Err(join_err) => warn!(error = %join_err, "inference driver: provider task panicked"),
        }

        let content_blocks = final_blocks
            .unwrap_or_else(|| ContentBlock::from_legacy_content(&accumulated_text));

        Ok(GenerationOutcome {
            content_blocks,
            thought_signature,
            tokens_in,
            tokens_out,
            model,
            cancelled,
            failed,
        })
    }
}

fn req_model(provider: &Arc<dyn LlmProvider>) -> String {
    provider.name().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use crate::types::{ChatHints, ChatResponse};

    struct FakeSlot {
        available: AtomicBool,
    }

    impl GenerationSlot for FakeSlot {
        fn acquire(&self) -> bool {
            self.available.swap(false, Ordering::SeqCst)
        }
        fn release(&self) {
            self.available.store(true, Ordering::SeqCst);
        }
    }

    struct FakeProvider;

    #[async_trait]
    impl LlmProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse> {
            Ok(ChatResponse {
                content_blocks: ContentBlock::from_legacy_content("hello world"),
                model: "fake-model".to_string(),
                tokens_in: 10,
                tokens_out: 5,
                stop_reason: "end_turn".to_string(),
                thought_signature: None,
            })
        }
    }

    struct ErroringProvider;

    #[async_trait]
    impl LlmProvider for ErroringProvider {
        fn name(&self) -> &str {
            "erroring"
        }

        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse> {
            unreachable!("this provider only exercises send_stream")
        }

        async fn send_stream(
            &self,
            _req: &ChatRequest,
            tx: mpsc::Sender<StreamEvent>,
        ) -> Result<()> {
            let _ = tx
                .send(StreamEvent::TextDelta {
                    text: "partial".to_string(),
                    content_blocks: None,
                })
                .await;
            let _ = tx
                .send(StreamEvent::Error {
                    kind: UpstreamKind::Overloaded,
                    message: "upstream exploded".to_string(),
                })
                .await;
            Ok(())
        }
    }

    fn sample_request() -> ChatRequest {
        ChatRequest {
            model: "fake-model".to_string(),
            system_prompt: None,
            messages: Vec::new(),
            max_tokens: 100,
            hints: ChatHints::default(),
        }
    }

    #[tokio::test]
    async fn run_produces_outcome_from_fallback_stream() {
        let slot = Arc::new(FakeSlot {
            available: AtomicBool::new(true),
        });
        let driver = InferenceDriver::new(Arc::new(FakeProvider), slot.clone());
        let chunks = Arc::new(Mutex::new(Vec::new()));
        let chunks_clone = chunks.clone();

        let outcome = driver
            .run(&sample_request(), CancellationToken::new(), |text, done, _| {
                chunks_clone.lock().unwrap().push((text.to_string(), done));
            })
            .await
            .unwrap();

        assert_eq!(outcome.tokens_in, 10);
        assert_eq!(outcome.tokens_out, 5);
        assert!(!outcome.cancelled);
        assert!(slot.available.load(Ordering::SeqCst));
        assert!(!chunks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_fails_busy_when_slot_already_taken() {
        let slot = Arc::new(FakeSlot {
            available: AtomicBool::new(false),
        });
        let driver = InferenceDriver::new(Arc::new(FakeProvider), slot);
        let err = driver
            .run(&sample_request(), CancellationToken::new(), |_, _, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Busy));
    }

    #[tokio::test]
    async fn cancellation_releases_slot_and_marks_outcome_cancelled() {
        struct SlowProvider;

        #[async_trait]
        impl LlmProvider for SlowProvider {
            fn name(&self) -> &str {
                "slow"
            }
            async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse> {
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                unreachable!("cancellation should pre-empt this")
            }
        }

        let slot = Arc::new(FakeSlot {
            available: AtomicBool::new(true),
        });
        let driver = InferenceDriver::new(Arc::new(SlowProvider), slot.clone());
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            cancel_clone.cancel();
        });

        let outcome = driver
            .run(&sample_request(), cancel, |_, _, _| {})
            .await
            .unwrap();
        assert!(outcome.cancelled);
        assert!(slot.available.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn mid_stream_error_is_reported_as_failed_with_partial_text_kept() {
        let slot = Arc::new(FakeSlot {
            available: AtomicBool::new(true),
        });
        let driver = InferenceDriver::new(Arc::new(ErroringProvider), slot.clone());

        let outcome = driver
            .run(&sample_request(), CancellationToken::new(), |_, _, _| {})
            .await
            .unwrap();

        assert_eq!(outcome.failed, Some(UpstreamKind::Overloaded));
        assert!(!outcome.cancelled);
        assert_eq!(
            braid_protocol::ContentBlock::to_plain_text(&outcome.content_blocks),
            "partial"
        );
        assert!(slot.available.load(Ordering::SeqCst));
    }
}
