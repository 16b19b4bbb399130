use braid_tree::RenderedMessage;
use serde::{Deserialize, Serialize};

use crate::estimator::estimate_total_tokens;
use crate::rolling::{PrepareMetadata, RollingConfig, RollingStrategy};

/// Hints a prepared prompt passes along to the provider layer (§4.5 "Prompt
/// emission").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHints {
    pub cache_anchor_index: Option<usize>,
    pub stop_sequences: Vec<String>,
    pub image_inline_budget: Option<usize>,
}

/// The `{systemPrompt, messages[], providerHints}` result of one `prepare`
/// call (§4.5).
#[derive(Debug, Clone)]
pub struct PreparedContext {
    pub system_prompt: Option<String>,
    pub messages: Vec<RenderedMessage>,
    pub provider_hints: ProviderHints,
}

/// Per-conversation context-management strategy (§4.5).
#[derive(Debug, Clone)]
pub enum ContextStrategy {
    /// Include the entire active path, unbounded.
    Append,
    Rolling(RollingStrategy),
}

impl ContextStrategy {
    pub fn rolling(config: RollingConfig) -> Self {
        ContextStrategy::Rolling(RollingStrategy::new(config))
    }

    pub fn prepare(
        &mut self,
        system_prompt: Option<String>,
        messages: &[RenderedMessage],
        new_message: Option<&RenderedMessage>,
    ) -> (PreparedContext, PrepareMetadata) {
        match self {
            ContextStrategy::Append => {
                let mut kept = messages.to_vec();
                if let Some(new_message) = new_message {
                    kept.push(new_message.clone());
                }
                let total_tokens = estimate_total_tokens(&kept);
                let metadata = PrepareMetadata {
                    total_tokens,
                    in_grace_period: false,
                    dropped_messages: 0,
                    cache_anchor_index: None,
                    rotated: false,
                };
                let prepared = PreparedContext {
                    system_prompt,
                    messages: kept,
                    provider_hints: ProviderHints::default(),
                };
                (prepared, metadata)
            }
            ContextStrategy::Rolling(rolling) => {
                let (kept, metadata) = rolling.prepare(messages, new_message);
                let prepared = PreparedContext {
                    system_prompt,
                    messages: kept,
                    provider_hints: ProviderHints {
                        cache_anchor_index: metadata.cache_anchor_index,
                        stop_sequences: Vec::new(),
                        image_inline_budget: None,
                    },
                };
                (prepared, metadata)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_core::{BranchId, MessageId};
    use braid_tree::Role;

    fn msg(order: i64) -> RenderedMessage {
        RenderedMessage {
            message_id: MessageId::new(),
            branch_id: BranchId::new(),
            order,
            role: Role::User,
            content_blocks: braid_protocol::ContentBlock::from_legacy_content("hello"),
            participant_id: None,
        }
    }

    #[test]
    fn append_strategy_never_drops_and_never_anchors() {
        let mut strategy = ContextStrategy::Append;
        let messages: Vec<_> = (0..50).map(msg).collect();
        let (prepared, meta) = strategy.prepare(Some("sys".to_string()), &messages, None);
        assert_eq!(prepared.messages.len(), 50);
        assert_eq!(meta.dropped_messages, 0);
        assert!(prepared.provider_hints.cache_anchor_index.is_none());
    }
}
