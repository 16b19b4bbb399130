use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use braid_core::{ConversationId, UserId};
use braid_protocol::EventEnvelope;
use dashmap::DashMap;
use tracing::{instrument, warn};

use crate::error::{Result, StorageError};
use crate::paths;

/// Identifies one of the three log categories (§4.1): a single shared main
/// log, one log per user, or one log per conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogId {
    Main,
    User(UserId),
    Conversation(ConversationId),
}

/// Result of loading a log: the successfully parsed events, plus a count of
/// lines skipped because they were malformed or carried an unrecognized
/// `type` tag.
#[derive(Debug, Default)]
pub struct LoadResult {
    pub events: Vec<EventEnvelope>,
    pub skipped_lines: u64,
}

impl LogId {
    fn path(&self, root: &Path) -> PathBuf {
        match self {
            LogId::Main => paths::main_log_path(root),
            LogId::User(id) => paths::user_log_path(root, id.as_str()),
            LogId::Conversation(id) => paths::conversation_log_path(root, id.as_str()),
        }
    }
}

/// Durable append-only event log, sharded on disk per §4.1.
///
/// Append handles are cached per path behind a `DashMap` so concurrent
/// writers to *different* logs never contend on a single lock; a given log
/// still serializes through its own `Mutex<File>` (per-conversation
/// single-writer, §5).
pub struct FileEventLog {
    root: PathBuf,
    handles: DashMap<PathBuf, Arc<Mutex<File>>>,
}

impl FileEventLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            handles: DashMap::new(),
        }
    }

    pub fn path_for(&self, log_id: &LogId) -> PathBuf {
        log_id.path(&self.root)
    }

    /// Create the log file (and parent directories) if needed, and register
    /// an append handle for it. Idempotent.
    #[instrument(skip(self))]
    pub fn init(&self, log_id: &LogId) -> Result<()> {
        let path = self.path_for(log_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        if !self.handles.contains_key(&path) {
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            self.handles.insert(path, Arc::new(Mutex::new(file)));
        }
        Ok(())
    }

    /// Append one event, flushing before returning — durability is required
    /// for user-observable state (§4.1).
    #[instrument(skip(self, event), fields(kind = event.kind.kind_str()))]
    pub fn append(&self, log_id: &LogId, event: &EventEnvelope) -> Result<()> {
        let path = self.path_for(log_id);
        let handle = self
            .handles
            .get(&path)
            .ok_or_else(|| StorageError::NotInitialized(path.display().to_string()))?;
        let mut file = handle.lock().unwrap();
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Load all events from a log in file order. Blank lines are skipped; a
    /// line that fails to parse — including one whose `type` tag is not a
    /// kind this build recognizes — is skipped and logged, never aborts
    /// replay.
    #[instrument(skip(self))]
    pub fn load(&self, log_id: &LogId) -> Result<Vec<EventEnvelope>> {
        Ok(self.load_with_stats(log_id)?.events)
    }

    /// Same as `load`, but also reports how many lines were skipped — the
    /// observability counter §4.2 calls for at startup.
    #[instrument(skip(self))]
    pub fn load_with_stats(&self, log_id: &LogId) -> Result<LoadResult> {
        let path = self.path_for(log_id);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LoadResult::default())
            }
            Err(e) => return Err(e.into()),
        };
        let reader = BufReader::new(file);
        let mut events = Vec::new();
        let mut skipped_lines = 0u64;
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<EventEnvelope>(&line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    skipped_lines += 1;
                    warn!(lineno, error = %e, "skipping malformed or unrecognized event line");
                }
            }
        }
        Ok(LoadResult { events, skipped_lines })
    }

    /// Drop the cached append handle for a log. Idempotent — closing an
    /// unopened log is a no-op.
    pub fn close(&self, log_id: &LogId) {
        let path = self.path_for(log_id);
        self.handles.remove(&path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_protocol::EventKind;

    #[test]
    fn append_without_init_fails_not_initialized() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileEventLog::new(dir.path());
        let conv = ConversationId::new();
        let event = EventEnvelope::new(EventKind::MessageDeleted {
            message_id: "m1".to_string(),
        });
        let err = log.append(&LogId::Conversation(conv), &event).unwrap_err();
        assert!(matches!(err, StorageError::NotInitialized(_)));
    }

    #[test]
    fn append_then_load_roundtrips_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileEventLog::new(dir.path());
        let conv = ConversationId::new();
        let log_id = LogId::Conversation(conv);
        log.init(&log_id).unwrap();

        for i in 0..3 {
            let event = EventEnvelope::new(EventKind::MessageDeleted {
                message_id: format!("m{i}"),
            });
            log.append(&log_id, &event).unwrap();
        }

        let events = log.load(&log_id).unwrap();
        assert_eq!(events.len(), 3);
        match &events[1].kind {
            EventKind::MessageDeleted { message_id } => assert_eq!(message_id, "m1"),
            _ => panic!("wrong kind"),
        }
    }

    #[test]
    fn malformed_line_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileEventLog::new(dir.path());
        let conv = ConversationId::new();
        let log_id = LogId::Conversation(conv);
        log.init(&log_id).unwrap();
        log.append(
            &log_id,
            &EventEnvelope::new(EventKind::MessageDeleted {
                message_id: "good".to_string(),
            }),
        )
        .unwrap();

        let path = log.path_for(&log_id);
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(f, "not json at all").unwrap();
        }

        let events = log.load(&log_id).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn close_is_idempotent_and_reinit_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileEventLog::new(dir.path());
        let conv = ConversationId::new();
        let log_id = LogId::Conversation(conv);
        log.init(&log_id).unwrap();
        log.close(&log_id);
        log.close(&log_id);
        log.init(&log_id).unwrap();
        log.append(
            &log_id,
            &EventEnvelope::new(EventKind::MessageDeleted {
                message_id: "m".to_string(),
            }),
        )
        .unwrap();
        assert_eq!(log.load(&log_id).unwrap().len(), 1);
    }
}
