use std::path::{Path, PathBuf};

/// First-two/next-two hex char sharding (§4.1 path policy), applied
/// uniformly to conversation logs, blobs, and conversation-state files.
pub fn shard(id: &str) -> (String, String) {
    let mut chars = id.chars();
    let aa: String = chars.by_ref().take(2).collect();
    let bb: String = chars.by_ref().take(2).collect();
    let aa = if aa.len() == 2 { aa } else { "00".to_string() };
    let bb = if bb.len() == 2 { bb } else { "00".to_string() };
    (aa, bb)
}

pub fn conversation_log_path(root: &Path, conversation_id: &str) -> PathBuf {
    let (aa, bb) = shard(conversation_id);
    root.join("conversations")
        .join(&aa)
        .join(&bb)
        .join(format!("{conversation_id}.jsonl"))
}

pub fn user_log_path(root: &Path, user_id: &str) -> PathBuf {
    let (aa, _) = shard(user_id);
    root.join("users").join(&aa).join(format!("{user_id}.jsonl"))
}

pub fn main_log_path(root: &Path) -> PathBuf {
    root.join("events.jsonl")
}

pub fn shared_state_path(root: &Path, conversation_id: &str) -> PathBuf {
    let (aa, _) = shard(conversation_id);
    root.join("conversation-state")
        .join(&aa)
        .join(format!("{conversation_id}.json"))
}

pub fn user_state_path(root: &Path, conversation_id: &str, user_id: &str) -> PathBuf {
    let (aa, _) = shard(conversation_id);
    root.join("user-conversation-state")
        .join(&aa)
        .join(conversation_id)
        .join(format!("{user_id}.json"))
}

pub fn blob_paths(root: &Path, blob_id: &str) -> (PathBuf, PathBuf) {
    let (aa, bb) = shard(blob_id);
    let dir = root.join("blobs").join(&aa).join(&bb);
    (dir.join(format!("{blob_id}.bin")), dir.join(format!("{blob_id}.meta")))
}

pub fn blob_index_path(root: &Path) -> PathBuf {
    root.join("blobs").join("hash_index.jsonl")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_splits_first_four_hex_chars() {
        assert_eq!(shard("abcd1234"), ("ab".to_string(), "cd".to_string()));
    }

    #[test]
    fn conversation_log_path_matches_layout() {
        let root = Path::new("/data");
        let p = conversation_log_path(root, "abcd1234");
        assert_eq!(p, PathBuf::from("/data/conversations/ab/cd/abcd1234.jsonl"));
    }
}
