use braid_core::{GrantCapabilityId, GrantEntryId, InviteCode, Timestamp, UserId};

/// `{id, ts, type, amount, currency, fromUserId?, toUserId?, reason?, details?}` (§6.2).
#[derive(Debug, Clone, PartialEq)]
pub struct GrantEntry {
    pub id: GrantEntryId,
    pub ts: Timestamp,
    pub grant_type: GrantType,
    pub amount: i64,
    pub currency: String,
    pub from_user_id: Option<UserId>,
    pub to_user_id: Option<UserId>,
    pub reason: Option<String>,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    Mint,
    Burn,
    Send,
    Tally,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::Mint => "mint",
            GrantType::Burn => "burn",
            GrantType::Send => "send",
            GrantType::Tally => "tally",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "burn" => GrantType::Burn,
            "send" => GrantType::Send,
            "tally" => GrantType::Tally,
            _ => GrantType::Mint,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrantCapability {
    pub id: GrantCapabilityId,
    pub ts: Timestamp,
    pub user_id: UserId,
    pub action: CapabilityAction,
    pub capability: String,
    pub expires_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityAction {
    Granted,
    Revoked,
}

impl CapabilityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityAction::Granted => "granted",
            CapabilityAction::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "revoked" => CapabilityAction::Revoked,
            _ => CapabilityAction::Granted,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invite {
    pub code: InviteCode,
    pub creator_user_id: UserId,
    pub amount: i64,
    pub currency: String,
    pub expires_at: Option<Timestamp>,
    pub max_uses: Option<u32>,
    pub uses: u32,
}

impl Invite {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        matches!(self.expires_at, Some(exp) if now >= exp)
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.max_uses, Some(max) if self.uses >= max)
    }
}

/// Maps legacy currency aliases onto their current names, and fills in the
/// default currency when absent (§4.8).
pub fn normalize_currency(currency: Option<&str>) -> String {
    match currency {
        None | Some("") => "credit".to_string(),
        Some("opus") => "claude3opus".to_string(),
        Some("sonnets") => "old_sonnets".to_string(),
        Some(other) => other.to_string(),
    }
}
