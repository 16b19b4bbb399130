use std::collections::HashMap;
use std::fs;

use braid_core::ConversationId;
use braid_protocol::{EventEnvelope, EventKind};
use tracing::instrument;

use crate::blob_store::BlobStore;
use crate::error::Result;
use crate::event_log::{FileEventLog, LogId};

/// Outcome of one compaction pass (§4.9).
#[derive(Debug, Clone, Default)]
pub struct CompactionReport {
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub events_before: u64,
    pub events_after: u64,
    pub removed_by_kind: HashMap<String, u64>,
}

/// Rewrite one conversation log, removing reconstructable events and
/// shrinking large debug payloads, while preserving observable replay state.
#[instrument(skip(log, blobs))]
pub fn compact(
    log: &FileEventLog,
    blobs: &BlobStore,
    conversation_id: &ConversationId,
) -> Result<CompactionReport> {
    let log_id = LogId::Conversation(conversation_id.clone());
    let path = log.path_for(&log_id);
    let bytes_before = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

    let events = log.load(&log_id)?;
    let events_before = events.len() as u64;
    let mut removed_by_kind: HashMap<String, u64> = HashMap::new();
    let mut rewritten = Vec::with_capacity(events.len());

    for event in events {
        if event.kind.is_reconstructable() {
            *removed_by_kind.entry(event.kind.kind_str().to_string()).or_insert(0) += 1;
            continue;
        }
        rewritten.push(strip_debug_payload(event, blobs)?);
    }

    let events_after = rewritten.len() as u64;

    if path.exists() {
        let backup = path.with_extension("jsonl.pre-compact.bak");
        fs::rename(&path, &backup)?;
    }

    let tmp_path = path.with_extension("jsonl.compacting");
    {
        use std::io::Write;
        let mut f = fs::File::create(&tmp_path)?;
        for event in &rewritten {
            let mut line = serde_json::to_string(event)?;
            line.push('\n');
            f.write_all(line.as_bytes())?;
        }
        f.flush()?;
    }
    fs::rename(&tmp_path, &path)?;
    log.close(&log_id);
    log.init(&log_id)?;

    let bytes_after = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

    Ok(CompactionReport {
        bytes_before,
        bytes_after,
        events_before,
        events_after,
        removed_by_kind,
    })
}

/// Strip large debug fields from a `message_branch_updated` event, saving
/// them to the blob store and replacing them with blob references.
fn strip_debug_payload(event: EventEnvelope, blobs: &BlobStore) -> Result<EventEnvelope> {
    let EventEnvelope { timestamp, kind } = event;
    let kind = match kind {
        EventKind::MessageBranchUpdated {
            message_id,
            branch_id,
            content_blocks,
            thought_signature,
            debug_request,
            debug_response,
            mut debug_request_blob_id,
            mut debug_response_blob_id,
        } => {
            if let Some(req) = debug_request {
                let bytes = serde_json::to_vec(&req)?;
                debug_request_blob_id = Some(blobs.save(&bytes, "application/json")?.to_string());
            }
            if let Some(resp) = debug_response {
                let bytes = serde_json::to_vec(&resp)?;
                debug_response_blob_id =
                    Some(blobs.save(&bytes, "application/json")?.to_string());
            }
            EventKind::MessageBranchUpdated {
                message_id,
                branch_id,
                content_blocks,
                thought_signature,
                debug_request: None,
                debug_response: None,
                debug_request_blob_id,
                debug_response_blob_id,
            }
        }
        other => other,
    };
    Ok(EventEnvelope { timestamp, kind })
}
