use braid_core::{GrantCapabilityId, GrantEntryId, InviteCode, Timestamp, UserId};
use braid_protocol::EventKind;
use dashmap::DashMap;
use tracing::debug;

use crate::entity::{normalize_currency, CapabilityAction, GrantType, Invite};
use crate::error::{GrantError, Result};

/// Folded grant-ledger state: per-(user, currency) balances, latest
/// capability grant/revoke per (user, capability), and invite bookkeeping.
/// Built by replaying `grant_*`/`invite_*` events (§4.8); never persists
/// anything itself, that is `braid-storage`'s job.
#[derive(Debug, Default)]
pub struct GrantLedger {
    balances: DashMap<(UserId, String), i64>,
    capabilities: DashMap<(UserId, String), (CapabilityAction, Option<Timestamp>)>,
    invites: DashMap<InviteCode, Invite>,
}

impl GrantLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, user_id: &UserId, currency: &str) -> i64 {
        self.balances
            .get(&(user_id.clone(), currency.to_string()))
            .map(|b| *b)
            .unwrap_or(0)
    }

    /// Builds the `grant_*` event for a new ledger entry and folds it into
    /// `to_user_id`'s (or `from_user_id`'s, for a pure burn) balance.
    /// Mutates state immediately; the returned event is for the caller to
    /// append to storage, not to feed back into [`GrantLedger::apply`].
    /// Amounts may drive a balance negative; enforcement is a pricing policy
    /// decision made elsewhere, not here.
    pub fn record_grant(
        &self,
        grant_type: GrantType,
        amount: i64,
        currency: Option<&str>,
        from_user_id: Option<UserId>,
        to_user_id: Option<UserId>,
        reason: Option<String>,
        details: Option<serde_json::Value>,
    ) -> EventKind {
        let currency = normalize_currency(currency);
        let entry_id = GrantEntryId::new();
        let event = EventKind::GrantInfo {
            entry_id: entry_id.to_string(),
            grant_type: grant_type.as_str().to_string(),
            amount,
            currency,
            from_user_id: from_user_id.map(|u| u.to_string()),
            to_user_id: to_user_id.map(|u| u.to_string()),
            reason,
            details,
        };
        self.apply(&event);
        event
    }

    pub fn record_capability(
        &self,
        user_id: UserId,
        action: CapabilityAction,
        capability: String,
        expires_at: Option<Timestamp>,
    ) -> EventKind {
        let event = EventKind::GrantCapability {
            capability_id: GrantCapabilityId::new().to_string(),
            user_id: user_id.to_string(),
            action: action.as_str().to_string(),
            capability,
            expires_at: expires_at.map(|t| t.to_rfc3339()),
        };
        self.apply(&event);
        event
    }

    /// `hasActive(userId, capability)` (§4.8): the latest recorded action for
    /// this pair is `granted`, and either no expiry was set or `now` is
    /// still before it.
    pub fn has_active(&self, user_id: &UserId, capability: &str, now: Timestamp) -> bool {
        match self.capabilities.get(&(user_id.clone(), capability.to_string())) {
            Some(entry) => {
                let (action, expires_at) = *entry;
                action == CapabilityAction::Granted
                    && expires_at.map(|exp| now < exp).unwrap_or(true)
            }
            None => false,
        }
    }

    pub fn create_invite(
        &self,
        code: InviteCode,
        creator_user_id: UserId,
        amount: i64,
        currency: Option<&str>,
        expires_at: Option<Timestamp>,
        max_uses: Option<u32>,
    ) -> Result<EventKind> {
        if self.invites.contains_key(&code) {
            return Err(GrantError::InviteAlreadyExists(code.to_string()));
        }
        let currency = normalize_currency(currency);
        let event = EventKind::InviteCreated {
            code: code.to_string(),
            creator_user_id: creator_user_id.to_string(),
            amount,
            currency,
            expires_at: expires_at.map(|t| t.to_rfc3339()),
            max_uses,
        };
        self.apply(&event);
        Ok(event)
    }

    /// Checks whether `code` can still be claimed without mutating state.
    pub fn validate(&self, code: &InviteCode, now: Timestamp) -> Result<()> {
        let invite = self
            .invites
            .get(code)
            .ok_or_else(|| GrantError::InviteNotFound(code.to_string()))?;
        if invite.is_expired(now) {
            return Err(GrantError::InviteExpired(code.to_string()));
        }
        if invite.is_exhausted() {
            return Err(GrantError::InviteExhausted(code.to_string()));
        }
        Ok(())
    }

    /// Atomically checks eligibility and increments usage, returning both the
    /// `invite_claimed` event and the `grant_*` event minted for `claimer`.
    /// The eligibility check and the usage increment happen under the same
    /// `DashMap` entry lock so two concurrent claims against a `maxUses=1`
    /// invite cannot both succeed (§8 scenario 5).
    pub fn claim(&self, code: &InviteCode, claimer: UserId, now: Timestamp) -> Result<(EventKind, EventKind)> {
        let mut entry = self
            .invites
            .get_mut(code)
            .ok_or_else(|| GrantError::InviteNotFound(code.to_string()))?;
        if entry.is_expired(now) {
            return Err(GrantError::InviteExpired(code.to_string()));
        }
        if entry.is_exhausted() {
            return Err(GrantError::InviteExhausted(code.to_string()));
        }
        entry.uses += 1;
        let (amount, currency) = (entry.amount, entry.currency.clone());
        drop(entry);

        let claim_event = EventKind::InviteClaimed {
            code: code.to_string(),
            claimer_user_id: claimer.to_string(),
        };
        let grant_event = self.record_grant(
            GrantType::Mint,
            amount,
            Some(&currency),
            None,
            Some(claimer),
            Some(format!("invite:{code}")),
            None,
        );
        Ok((claim_event, grant_event))
    }

    /// Folds a single event into ledger state during replay from storage.
    /// Live calls go through `record_grant`/`record_capability`/`create_invite`/
    /// `claim`, which already mutate state themselves — applying their
    /// returned event again here would double-fold it (an `invite_claimed`
    /// would increment `uses` a second time). Backed by `DashMap`s, so this
    /// only needs `&self`.
    pub fn apply(&self, event: &EventKind) {
        match event {
            EventKind::GrantInfo {
                amount,
                currency,
                from_user_id,
                to_user_id,
                ..
            } => {
                if let Some(from) = from_user_id {
                    let key = (UserId::from(from.clone()), currency.clone());
                    *self.balances.entry(key).or_insert(0) -= amount;
                }
                if let Some(to) = to_user_id {
                    let key = (UserId::from(to.clone()), currency.clone());
                    *self.balances.entry(key).or_insert(0) += amount;
                } else if from_user_id.is_none() {
                    debug!("grant event with neither fromUserId nor toUserId, ignoring balance effect");
                }
            }
            EventKind::GrantCapability {
                user_id,
                action,
                capability,
                expires_at,
                ..
            } => {
                let key = (UserId::from(user_id.clone()), capability.clone());
                let expires_at = expires_at.as_deref().and_then(Timestamp::from_rfc3339);
                self.capabilities
                    .insert(key, (CapabilityAction::parse(action), expires_at));
            }
            EventKind::InviteCreated {
                code,
                creator_user_id,
                amount,
                currency,
                expires_at,
                max_uses,
            } => {
                self.invites.insert(
                    InviteCode::from(code.clone()),
                    Invite {
                        code: InviteCode::from(code.clone()),
                        creator_user_id: UserId::from(creator_user_id.clone()),
                        amount: *amount,
                        currency: currency.clone(),
                        expires_at: expires_at.as_deref().and_then(Timestamp::from_rfc3339),
                        max_uses: *max_uses,
                        uses: 0,
                    },
                );
            }
            EventKind::InviteClaimed { code, .. } => {
                if let Some(mut invite) = self.invites.get_mut(&InviteCode::from(code.clone())) {
                    invite.uses += 1;
                } else {
                    debug!(code = %code, "invite_claimed for unknown invite during replay");
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_grant_folds_into_recipient_balance() {
        let ledger = GrantLedger::new();
        let user = UserId::new();
        ledger.record_grant(GrantType::Mint, 10, None, None, Some(user.clone()), None, None);
        assert_eq!(ledger.balance(&user, "credit"), 10);
    }

    #[test]
    fn legacy_currency_alias_folds_into_mapped_currency() {
        let ledger = GrantLedger::new();
        let user = UserId::new();
        ledger.record_grant(
            GrantType::Mint,
            5,
            Some("opus"),
            None,
            Some(user.clone()),
            None,
            None,
        );
        assert_eq!(ledger.balance(&user, "claude3opus"), 5);
        assert_eq!(ledger.balance(&user, "opus"), 0);
    }

    #[test]
    fn burn_can_drive_balance_negative() {
        let ledger = GrantLedger::new();
        let user = UserId::new();
        ledger.record_grant(
            GrantType::Burn,
            20,
            None,
            Some(user.clone()),
            None,
            None,
            None,
        );
        assert_eq!(ledger.balance(&user, "credit"), -20);
    }

    #[test]
    fn has_active_respects_latest_action_and_expiry() {
        let ledger = GrantLedger::new();
        let user = UserId::new();
        let t0 = Timestamp::from_millis(1_000);
        let t1 = Timestamp::from_millis(2_000);

        ledger.record_capability(user.clone(), CapabilityAction::Granted, "beta".to_string(), Some(t1));
        assert!(ledger.has_active(&user, "beta", t0));
        assert!(!ledger.has_active(&user, "beta", Timestamp::from_millis(3_000)));

        ledger.record_capability(user.clone(), CapabilityAction::Revoked, "beta".to_string(), None);
        assert!(!ledger.has_active(&user, "beta", t0));
    }

    #[test]
    fn invite_overclaim_is_rejected_and_mints_no_second_grant() {
        let ledger = GrantLedger::new();
        let creator = UserId::new();
        let u1 = UserId::new();
        let u2 = UserId::new();
        let code = InviteCode::from("LIM");
        let now = Timestamp::from_millis(1_000);

        ledger
            .create_invite(code.clone(), creator, 10, Some("credit"), None, Some(1))
            .unwrap();

        ledger.claim(&code, u1.clone(), now).unwrap();
        assert_eq!(ledger.balance(&u1, "credit"), 10);

        let err = ledger.claim(&code, u2.clone(), now).unwrap_err();
        assert!(matches!(err, GrantError::InviteExhausted(_)));
        assert_eq!(ledger.balance(&u2, "credit"), 0);
    }

    #[test]
    fn expired_invite_cannot_be_claimed() {
        let ledger = GrantLedger::new();
        let creator = UserId::new();
        let claimer = UserId::new();
        let code = InviteCode::from("OLD");
        let expiry = Timestamp::from_millis(1_000);

        ledger
            .create_invite(code.clone(), creator, 5, None, Some(expiry), None)
            .unwrap();

        let err = ledger
            .claim(&code, claimer, Timestamp::from_millis(2_000))
            .unwrap_err();
        assert!(matches!(err, GrantError::InviteExpired(_)));
    }
}
