use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, RwLock};

use braid_core::{BranchId, ConversationId, MessageId, ParticipantId, Timestamp, UserId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::paths;

/// Mutable per-conversation state kept outside the event log (§4.4), shared
/// by all participants.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SharedState {
    #[serde(default)]
    pub active_branches: HashMap<MessageId, BranchId>,
    #[serde(default)]
    pub total_branch_count: u64,
}

/// Mutable per-user, per-conversation state (navigation, detachment, read
/// position).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserState {
    #[serde(default)]
    pub speaking_as: Option<ParticipantId>,
    #[serde(default)]
    pub selected_responder: Option<ParticipantId>,
    #[serde(default)]
    pub is_detached: bool,
    #[serde(default)]
    pub detached_branches: Option<HashMap<MessageId, BranchId>>,
    #[serde(default)]
    pub read_branch_ids: Option<Vec<BranchId>>,
    #[serde(default)]
    pub last_read_at: Option<Timestamp>,
}

impl UserState {
    /// Re-attaching clears `detachedBranches` (§4.4).
    pub fn reattach(&mut self) {
        self.is_detached = false;
        self.detached_branches = None;
    }
}

/// Cache-first, write-through persistence for `SharedState`/`UserState`.
///
/// Entries never expire on a timer — state is invalidated only by an
/// explicit write, since UI state must never appear stale to its own writer.
pub struct StateStore {
    root: std::path::PathBuf,
    shared: DashMap<ConversationId, Arc<RwLock<SharedState>>>,
    user: DashMap<(ConversationId, UserId), Arc<RwLock<UserState>>>,
}

impl StateStore {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self {
            root: root.into(),
            shared: DashMap::new(),
            user: DashMap::new(),
        }
    }

    pub fn get_shared(&self, conversation_id: &ConversationId) -> Result<SharedState> {
        if let Some(entry) = self.shared.get(conversation_id) {
            return Ok(entry.read().unwrap().clone());
        }
        let path = paths::shared_state_path(&self.root, conversation_id.as_str());
        let state: SharedState = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SharedState::default(),
            Err(e) => return Err(e.into()),
        };
        self.shared
            .insert(conversation_id.clone(), Arc::new(RwLock::new(state.clone())));
        Ok(state)
    }

    pub fn save_shared(&self, conversation_id: &ConversationId, state: SharedState) -> Result<()> {
        let path = paths::shared_state_path(&self.root, conversation_id.as_str());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_vec(&state)?)?;
        self.shared
            .insert(conversation_id.clone(), Arc::new(RwLock::new(state)));
        Ok(())
    }

    pub fn get_user_state(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
    ) -> Result<UserState> {
        let key = (conversation_id.clone(), user_id.clone());
        if let Some(entry) = self.user.get(&key) {
            return Ok(entry.read().unwrap().clone());
        }
        let path = paths::user_state_path(&self.root, conversation_id.as_str(), user_id.as_str());
        let state: UserState = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => UserState::default(),
            Err(e) => return Err(e.into()),
        };
        self.user.insert(key, Arc::new(RwLock::new(state.clone())));
        Ok(state)
    }

    pub fn save_user_state(
        &self,
        conversation_id: &ConversationId,
        user_id: &UserId,
        state: UserState,
    ) -> Result<()> {
        let path = paths::user_state_path(&self.root, conversation_id.as_str(), user_id.as_str());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_vec(&state)?)?;
        self.user
            .insert((conversation_id.clone(), user_id.clone()), Arc::new(RwLock::new(state)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_shared_state_defaults_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let conv = ConversationId::new();
        let state = store.get_shared(&conv).unwrap();
        assert_eq!(state.total_branch_count, 0);
    }

    #[test]
    fn save_then_get_is_cache_consistent_without_reread() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let conv = ConversationId::new();
        let mut state = store.get_shared(&conv).unwrap();
        state.total_branch_count = 5;
        store.save_shared(&conv, state).unwrap();

        // Delete the file on disk — cache must still reflect the write.
        let path = paths::shared_state_path(dir.path(), conv.as_str());
        let _ = fs::remove_file(path);

        let reread = store.get_shared(&conv).unwrap();
        assert_eq!(reread.total_branch_count, 5);
    }

    #[test]
    fn reattach_clears_detached_branches() {
        let mut user_state = UserState {
            is_detached: true,
            detached_branches: Some(HashMap::new()),
            ..Default::default()
        };
        user_state.reattach();
        assert!(!user_state.is_detached);
        assert!(user_state.detached_branches.is_none());
    }
}
