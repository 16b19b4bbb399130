pub mod entity;
pub mod error;
pub mod ledger;

pub use entity::{normalize_currency, CapabilityAction, GrantCapability, GrantEntry, GrantType, Invite};
pub use error::{GrantError, Result};
pub use ledger::GrantLedger;
