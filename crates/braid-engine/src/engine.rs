use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use braid_core::{ConversationId, Timestamp, UserId};
use braid_protocol::{EventEnvelope, EventKind};
use braid_providers::{LlmProvider, SelectorState};
use braid_storage::{BlobStore, FileEventLog, LogId, StateStore};
use braid_tree::{Conversation, ConversationFormat, ConversationModel};
use dashmap::DashMap;

use crate::error::{EngineError, Result};

/// Top-level composition root wiring storage, the branch tree, the grant
/// ledger, and the live room registry behind the write-path/read-path data
/// flow (§2). No transport layer lives here; callers drive the engine
/// directly or from whatever protocol binding they provide.
pub struct Engine {
    pub storage: Arc<FileEventLog>,
    pub state: Arc<StateStore>,
    pub blobs: Arc<BlobStore>,
    pub grants: Arc<braid_grants::GrantLedger>,
    pub rooms: Arc<braid_rooms::RoomManager>,
    /// Per-process round-robin/least-used counters for the provider
    /// selector (§4.7) — deliberately not persisted, see `SelectorState`.
    pub selector: Arc<SelectorState>,
    providers: DashMap<String, Arc<dyn LlmProvider>>,
    conversations: DashMap<ConversationId, Arc<Mutex<ConversationModel>>>,
}

impl Engine {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        Ok(Self {
            storage: Arc::new(FileEventLog::new(&root)),
            state: Arc::new(StateStore::new(&root)),
            blobs: Arc::new(BlobStore::new(&root)?),
            grants: Arc::new(braid_grants::GrantLedger::new()),
            rooms: Arc::new(braid_rooms::RoomManager::new()),
            selector: Arc::new(SelectorState::new()),
            providers: DashMap::new(),
            conversations: DashMap::new(),
        })
    }

    /// Registers the concrete `LlmProvider` backing a configured
    /// `ProviderProfile::id`. The engine core never constructs HTTP clients
    /// itself — deployments wire those up and hand them in here.
    pub fn register_provider(&self, profile_id: impl Into<String>, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(profile_id.into(), provider);
    }

    pub(crate) fn provider_for(&self, profile_id: &str) -> Result<Arc<dyn LlmProvider>> {
        self.providers
            .get(profile_id)
            .map(|p| p.clone())
            .ok_or_else(|| EngineError::Braid(braid_core::BraidError::NotEligible(format!(
                "no provider registered for profile {profile_id}"
            ))))
    }

    /// Appends one event to whichever log its kind belongs to (§4.1),
    /// initializing that log on first use.
    fn append(&self, event: EventKind, user_id: Option<&UserId>, conversation_id: Option<&ConversationId>) -> Result<EventEnvelope> {
        let log_id = match event.category() {
            braid_protocol::LogCategory::Main => LogId::Main,
            braid_protocol::LogCategory::User => {
                let user_id = user_id.ok_or_else(|| {
                    EngineError::Braid(braid_core::BraidError::Internal(
                        "user-log event requires a userId".to_string(),
                    ))
                })?;
                LogId::User(user_id.clone())
            }
            braid_protocol::LogCategory::Conversation => {
                let conversation_id = conversation_id.ok_or_else(|| {
                    EngineError::Braid(braid_core::BraidError::Internal(
                        "conversation-log event requires a conversationId".to_string(),
                    ))
                })?;
                LogId::Conversation(conversation_id.clone())
            }
        };
        self.storage.init(&log_id)?;
        let envelope = EventEnvelope::new(event);
        self.storage.append(&log_id, &envelope)?;
        Ok(envelope)
    }

    /// Creates a new conversation owned by `owner_id`, emitting
    /// `conversation_created` to the owner's user log, and seeds the
    /// in-memory model so subsequent operations don't need a cold replay.
    pub fn create_conversation(&self, owner_id: UserId, title: String) -> Result<ConversationId> {
        let conversation_id = ConversationId::new();
        let event = EventKind::ConversationCreated {
            conversation_id: conversation_id.to_string(),
            owner_id: owner_id.to_string(),
            title: title.clone(),
            system_prompt: None,
            default_model_id: None,
            format: "standard".to_string(),
        };
        self.append(event, Some(&owner_id), None)?;
        self.storage.init(&LogId::Conversation(conversation_id.clone()))?;

        let conversation = Conversation {
            id: conversation_id.clone(),
            owner_id,
            title,
            system_prompt: None,
            default_model_id: None,
            format: ConversationFormat::Standard,
            context_config: None,
            created_at: Timestamp::now(),
            archived_at: None,
        };
        self.conversations.insert(
            conversation_id.clone(),
            Arc::new(Mutex::new(ConversationModel::new(conversation))),
        );
        Ok(conversation_id)
    }

    /// Returns the cached in-memory model for `conversation_id`, replaying
    /// it from `owner_id`'s user log and the conversation's own log on a
    /// cold cache miss.
    pub fn open_conversation(
        &self,
        owner_id: &UserId,
        conversation_id: &ConversationId,
    ) -> Result<Arc<Mutex<ConversationModel>>> {
        if let Some(model) = self.conversations.get(conversation_id) {
            return Ok(model.clone());
        }

        let user_log = self.storage.load_with_stats(&LogId::User(owner_id.clone()))?;
        let conversation_event = user_log
            .events
            .iter()
            .find_map(|e| match &e.kind {
                EventKind::ConversationCreated {
                    conversation_id: cid,
                    owner_id: oid,
                    title,
                    system_prompt,
                    default_model_id,
                    ..
                } if cid == conversation_id.as_str() => Some(Conversation {
                    id: conversation_id.clone(),
                    owner_id: UserId::from(oid.clone()),
                    title: title.clone(),
                    system_prompt: system_prompt.clone(),
                    default_model_id: default_model_id.clone(),
                    format: ConversationFormat::Standard,
                    context_config: None,
                    created_at: e.timestamp,
                    archived_at: None,
                }),
                _ => None,
            })
            .ok_or_else(|| EngineError::ConversationNotFound(conversation_id.to_string()))?;

        self.storage.init(&LogId::Conversation(conversation_id.clone()))?;
        let conversation_log = self
            .storage
            .load_with_stats(&LogId::Conversation(conversation_id.clone()))?;

        let (model, stats) = ConversationModel::replay(
            conversation_event,
            &user_log.events,
            &conversation_log.events,
            user_log.skipped_lines + conversation_log.skipped_lines,
        );
        tracing::info!(
            conversation_id = %conversation_id,
            applied = stats.applied_events,
            skipped = stats.skipped_lines,
            "replayed conversation"
        );

        let handle = Arc::new(Mutex::new(model));
        self.conversations.insert(conversation_id.clone(), handle.clone());
        Ok(handle)
    }

    /// Plans `op` against the conversation's branch tree, appends every
    /// resulting event to the conversation log, applies them to the cached
    /// model, and broadcasts them to the room. This is the single write
    /// path every message-tree mutation (§4.3) goes through.
    pub fn apply_tree_events(
        &self,
        conversation_id: &ConversationId,
        model: &Arc<Mutex<ConversationModel>>,
        events: Vec<EventKind>,
    ) -> Result<()> {
        let log_id = LogId::Conversation(conversation_id.clone());
        let mut guard = model.lock().unwrap();
        for event in events {
            let envelope = EventEnvelope::new(event);
            self.storage.append(&log_id, &envelope)?;
            guard.tree.apply(&envelope.kind);
        }
        Ok(())
    }
}
