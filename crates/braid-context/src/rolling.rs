use braid_tree::RenderedMessage;
use tracing::debug;

use crate::estimator::{estimate_message_tokens, estimate_total_tokens};

/// Parameters for the rolling-window strategy (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingConfig {
    pub max_tokens: u64,
    pub max_grace_tokens: u64,
    pub cache_min_tokens: u64,
    pub cache_depth_from_end: usize,
}

/// Carried between `prepare` calls for one conversation (§4.5 "state").
#[derive(Debug, Clone, Default)]
pub struct RollingState {
    pub in_grace_period: bool,
    pub baseline_tokens: u64,
    last_branch_signature: Option<String>,
}

/// Outcome of one `prepare` call: what to send, plus bookkeeping the caller
/// surfaces in logs/metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareMetadata {
    pub total_tokens: u64,
    pub in_grace_period: bool,
    pub dropped_messages: u64,
    pub cache_anchor_index: Option<usize>,
    pub rotated: bool,
}

#[derive(Debug, Clone)]
pub struct RollingStrategy {
    config: RollingConfig,
    state: RollingState,
}

impl RollingStrategy {
    pub fn new(config: RollingConfig) -> Self {
        Self {
            config,
            state: RollingState::default(),
        }
    }

    pub fn state(&self) -> &RollingState {
        &self.state
    }

    fn branch_signature(messages: &[RenderedMessage]) -> String {
        messages
            .iter()
            .map(|m| m.branch_id.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// The normative algorithm of §4.5, evaluated in the fixed order: rotate,
    /// then grace, then normal.
    pub fn prepare(
        &mut self,
        messages: &[RenderedMessage],
        new_message: Option<&RenderedMessage>,
    ) -> (Vec<RenderedMessage>, PrepareMetadata) {
        let branch_sig = Self::branch_signature(messages);
        if self.state.last_branch_signature.as_deref() != Some(branch_sig.as_str()) {
            debug!("rolling: branch signature changed, resetting grace state");
            self.state.in_grace_period = false;
            self.state.baseline_tokens = 0;
        }
        self.state.last_branch_signature = Some(branch_sig);

        let mut total_tokens = estimate_total_tokens(messages);
        if let Some(new_message) = new_message {
            total_tokens += estimate_message_tokens(new_message);
        }

        let mut kept = messages.to_vec();
        let mut dropped = 0u64;
        let mut rotated = false;

        if total_tokens > self.config.max_tokens + self.config.max_grace_tokens {
            rotated = true;
            let mut running = total_tokens;
            while running > self.config.max_tokens && !kept.is_empty() {
                let removed = kept.remove(0);
                running -= estimate_message_tokens(&removed);
                dropped += 1;
            }
            total_tokens = running;
            self.state.in_grace_period = false;
            self.state.baseline_tokens = 0;
        } else if total_tokens > self.config.max_tokens {
            if !self.state.in_grace_period {
                self.state.baseline_tokens = total_tokens;
            }
            self.state.in_grace_period = true;
        } else {
            self.state.in_grace_period = false;
            self.state.baseline_tokens = 0;
        }

        let cache_anchor_index = if total_tokens >= self.config.cache_min_tokens
            && self.config.cache_depth_from_end <= kept.len()
            && !kept.is_empty()
        {
            Some(kept.len() - self.config.cache_depth_from_end)
        } else {
            None
        };

        let metadata = PrepareMetadata {
            total_tokens,
            in_grace_period: self.state.in_grace_period,
            dropped_messages: dropped,
            cache_anchor_index,
            rotated,
        };
        (kept, metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_core::{BranchId, MessageId};
    use braid_tree::Role;

    fn msg(order: i64, tokens: u64, branch: &str) -> RenderedMessage {
        let text = "a".repeat((tokens * 4) as usize);
        RenderedMessage {
            message_id: MessageId::new(),
            branch_id: BranchId::from(branch),
            order,
            role: Role::User,
            content_blocks: braid_protocol::ContentBlock::from_legacy_content(&text),
            participant_id: None,
        }
    }

    fn config() -> RollingConfig {
        RollingConfig {
            max_tokens: 1000,
            max_grace_tokens: 500,
            cache_min_tokens: 100_000,
            cache_depth_from_end: 1,
        }
    }

    #[test]
    fn exactly_at_max_tokens_stays_normal() {
        let mut strategy = RollingStrategy::new(config());
        let messages: Vec<_> = (0..10).map(|i| msg(i, 100, "b1")).collect();
        let (_, meta) = strategy.prepare(&messages, None);
        assert_eq!(meta.total_tokens, 1000);
        assert!(!meta.in_grace_period);
        assert_eq!(meta.dropped_messages, 0);
    }

    #[test]
    fn one_over_max_enters_grace() {
        let mut strategy = RollingStrategy::new(config());
        let messages: Vec<_> = (0..11).map(|i| msg(i, 91, "b1")).collect(); // 1001 tokens
        let (kept, meta) = strategy.prepare(&messages, None);
        assert!(meta.in_grace_period);
        assert_eq!(meta.dropped_messages, 0);
        assert_eq!(kept.len(), messages.len());
    }

    #[test]
    fn scenario_linear_grace_then_rotation() {
        let mut strategy = RollingStrategy::new(config());
        let mut messages: Vec<_> = (0..8).map(|i| msg(i, 100, "b1")).collect();
        let (_, meta) = strategy.prepare(&messages, None);
        assert_eq!(meta.total_tokens, 800);
        assert!(!meta.in_grace_period);

        messages.extend((8..12).map(|i| msg(i, 100, "b1")));
        let (_, meta) = strategy.prepare(&messages, None);
        assert_eq!(meta.total_tokens, 1200);
        assert!(meta.in_grace_period);
        assert_eq!(meta.dropped_messages, 0);

        messages.extend((12..15).map(|i| msg(i, 100, "b1")));
        let (_, meta) = strategy.prepare(&messages, None);
        assert_eq!(meta.total_tokens, 1500);
        assert!(meta.in_grace_period);
        assert_eq!(meta.dropped_messages, 0);

        messages.extend(std::iter::once(msg(15, 100, "b1")));
        let (kept, meta) = strategy.prepare(&messages, None);
        assert!(meta.rotated);
        assert!(meta.total_tokens <= 1000);
        assert!(!meta.in_grace_period);
        assert!(kept.len() < messages.len());
    }

    #[test]
    fn branch_change_resets_grace_regardless_of_tokens() {
        let mut strategy = RollingStrategy::new(config());
        let messages: Vec<_> = (0..12).map(|i| msg(i, 100, "b1")).collect();
        let (_, meta) = strategy.prepare(&messages, None);
        assert!(meta.in_grace_period);

        let other_branch: Vec<_> = (0..4).map(|i| msg(i, 100, "b2")).collect();
        let (_, meta) = strategy.prepare(&other_branch, None);
        assert!(!meta.in_grace_period);
        assert_eq!(meta.dropped_messages, 0);
        assert_eq!(meta.total_tokens, 400);
    }

    #[test]
    fn cache_anchor_set_when_total_at_or_above_minimum() {
        let mut config = config();
        config.cache_min_tokens = 500;
        config.cache_depth_from_end = 2;
        let mut strategy = RollingStrategy::new(config);
        let messages: Vec<_> = (0..8).map(|i| msg(i, 100, "b1")).collect();
        let (kept, meta) = strategy.prepare(&messages, None);
        assert_eq!(meta.cache_anchor_index, Some(kept.len() - 2));
    }
}
