pub mod blob_store;
pub mod compactor;
pub mod error;
pub mod event_log;
pub mod paths;
pub mod state_store;

pub use blob_store::{BlobMeta, BlobStore};
pub use compactor::{compact, CompactionReport};
pub use error::{Result, StorageError};
pub use event_log::{FileEventLog, LoadResult, LogId};
pub use state_store::{SharedState, StateStore, UserState};
