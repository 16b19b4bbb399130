pub mod config;
pub mod error;
pub mod ids;
pub mod time;

pub use config::{BraidConfig, ConfigHandle, LoadBalancingStrategy, ModelsConfig, ProviderProfile};
pub use error::{BraidError, Result, UpstreamKind};
pub use ids::{
    BlobId, BranchId, ConnId, ConversationId, GrantCapabilityId, GrantEntryId, InviteCode,
    MessageId, ParticipantId, UserId,
};
pub use time::{DurationMs, Timestamp};
