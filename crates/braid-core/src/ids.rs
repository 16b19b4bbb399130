use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Declares an opaque 128-bit identifier rendered as a lowercase hex string
/// (no dashes), per the identifier policy: all IDs are 128-bit values with no
/// structural meaning beyond equality.
macro_rules! hex_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4().simple().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// The sentinel value used as the root parent of a branch tree.
            pub fn root() -> Self {
                Self("root".to_string())
            }

            pub fn is_root(&self) -> bool {
                self.0 == "root"
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

hex_id!(ConversationId, "Identifies a conversation (also the room ID).");
hex_id!(MessageId, "Identifies a message node in the branch tree.");
hex_id!(
    BranchId,
    "Identifies one concrete utterance variant of a message. `root` is the sentinel parent."
);
hex_id!(ParticipantId, "Identifies a participant in a conversation.");
hex_id!(UserId, "Identifies a user account.");
hex_id!(GrantEntryId, "Identifies one grant-ledger entry.");
hex_id!(GrantCapabilityId, "Identifies one capability grant/revocation record.");
hex_id!(BlobId, "Identifies a stored content-addressed blob.");

/// Per-connection identifier; not persisted, scoped to a process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnId(pub String);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An invite code is a short opaque token, not a 128-bit ID — callers pick
/// the string (e.g. a memorable code), so it is not auto-generated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InviteCode(pub String);

impl InviteCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InviteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InviteCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for InviteCode {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_sentinel_roundtrips() {
        let root = BranchId::root();
        assert!(root.is_root());
        assert_eq!(root.as_str(), "root");
    }

    #[test]
    fn fresh_ids_are_unique_and_not_root() {
        let a = ConversationId::new();
        let b = ConversationId::new();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn display_matches_as_str() {
        let id = MessageId::from("abc123");
        assert_eq!(format!("{}", id), "abc123");
        assert_eq!(id.as_str(), "abc123");
    }
}
