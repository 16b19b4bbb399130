use braid_core::config::{LoadBalancingStrategy, ProviderProfile};
use dashmap::DashMap;
use rand::Rng;

use crate::error::{ProviderError, Result};

/// Per-process, best-effort counters backing `round-robin` and `least-used`
/// tie-break (§5 "Provider selector counters ... not persisted").
#[derive(Debug, Default)]
pub struct SelectorState {
    round_robin: DashMap<String, u64>,
    usage: DashMap<String, u64>,
}

impl SelectorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `profile_id` was just picked, for `least-used` tie-break
    /// on the next call.
    pub fn record_usage(&self, profile_id: &str) {
        *self.usage.entry(profile_id.to_string()).or_insert(0) += 1;
    }
}

fn is_eligible(profile: &ProviderProfile, model_id: &str, user_group: Option<&str>) -> bool {
    let model_allowed = if let Some(allowed) = &profile.allowed_models {
        allowed.iter().any(|m| m == model_id)
    } else if let Some(costs) = &profile.model_costs {
        costs.contains_key(model_id)
    } else {
        true
    };
    if !model_allowed {
        return false;
    }
    if let Some(groups) = &profile.allowed_user_groups {
        match user_group {
            Some(g) => groups.iter().any(|allowed| allowed == g),
            None => false,
        }
    } else {
        true
    }
}

/// Choose the best eligible profile for `(modelId, userGroup)` from
/// `profiles`, applying §4.7's eligibility filter, priority ordering, and
/// configured tie-break strategy. `group_key` scopes round-robin counters
/// (e.g. by provider type); pass the same key across calls that should share
/// a rotation.
pub fn select_profile<'a>(
    profiles: &'a [&'a ProviderProfile],
    model_id: &str,
    user_group: Option<&str>,
    strategy: LoadBalancingStrategy,
    state: &SelectorState,
    group_key: &str,
) -> Result<&'a ProviderProfile> {
    let mut eligible: Vec<&ProviderProfile> = profiles
        .iter()
        .copied()
        .filter(|p| is_eligible(p, model_id, user_group))
        .collect();

    if eligible.is_empty() {
        return Err(ProviderError::NotEligible);
    }

    let best_priority = eligible.iter().map(|p| p.priority).min().unwrap();
    eligible.retain(|p| p.priority == best_priority);

    if eligible.len() == 1 {
        return Ok(eligible[0]);
    }

    let chosen = match strategy {
        LoadBalancingStrategy::First => eligible[0],
        LoadBalancingStrategy::Random => {
            let idx = rand::thread_rng().gen_range(0..eligible.len());
            eligible[idx]
        }
        LoadBalancingStrategy::RoundRobin => {
            let mut counter = state.round_robin.entry(group_key.to_string()).or_insert(0);
            let idx = (*counter as usize) % eligible.len();
            *counter += 1;
            eligible[idx]
        }
        LoadBalancingStrategy::LeastUsed => eligible
            .iter()
            .copied()
            .min_by_key(|p| state.usage.get(&p.id).map(|v| *v).unwrap_or(0))
            .unwrap(),
    };

    state.record_usage(&chosen.id);
    Ok(chosen)
}
