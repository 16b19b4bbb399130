use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;

use braid_core::{BlobId, Timestamp};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::instrument;

use crate::error::{Result, StorageError};
use crate::paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobMeta {
    pub mime: String,
    pub size: u64,
    pub hash: String,
    pub created_at: Timestamp,
}

/// Content-addressed storage of large payloads (§4.9). Path sharding mirrors
/// conversation log sharding, using the blob's own (random) ID — not the
/// hash — as the sharding key, so the layout is uniform with
/// `conversation_log_path`.
///
/// A flat hash→ID index on disk lets duplicate writes short-circuit even
/// across restarts, without re-scanning every blob on startup.
pub struct BlobStore {
    root: PathBuf,
    hash_index: DashMap<String, BlobId>,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let store = Self {
            root,
            hash_index: DashMap::new(),
        };
        store.load_index()?;
        Ok(store)
    }

    fn load_index(&self) -> Result<()> {
        let path = paths::blob_index_path(&self.root);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok((hash, id)) = serde_json::from_str::<(String, String)>(&line) {
                self.hash_index.insert(hash, BlobId::from(id));
            }
        }
        Ok(())
    }

    fn append_index(&self, hash: &str, id: &BlobId) -> Result<()> {
        let path = paths::blob_index_path(&self.root);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let line = serde_json::to_string(&(hash, id.as_str()))?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Store `bytes`; a prior write with the same content returns the
    /// existing ID and writes nothing new.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub fn save(&self, bytes: &[u8], mime: &str) -> Result<BlobId> {
        let hash = hex::encode(Sha256::digest(bytes));
        if let Some(existing) = self.hash_index.get(&hash) {
            return Ok(existing.clone());
        }

        let id = BlobId::new();
        let (blob_path, meta_path) = paths::blob_paths(&self.root, id.as_str());
        if let Some(parent) = blob_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&blob_path, bytes)?;
        let meta = BlobMeta {
            mime: mime.to_string(),
            size: bytes.len() as u64,
            hash: hash.clone(),
            created_at: Timestamp::now(),
        };
        fs::write(&meta_path, serde_json::to_vec(&meta)?)?;

        self.append_index(&hash, &id)?;
        self.hash_index.insert(hash, id.clone());
        Ok(id)
    }

    pub fn load(&self, id: &BlobId) -> Result<Vec<u8>> {
        let (blob_path, _) = paths::blob_paths(&self.root, id.as_str());
        let mut file = File::open(&blob_path)
            .map_err(|_| StorageError::NotFound(format!("blob {id}")))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    pub fn metadata(&self, id: &BlobId) -> Result<BlobMeta> {
        let (_, meta_path) = paths::blob_paths(&self.root, id.as_str());
        let bytes =
            fs::read(&meta_path).map_err(|_| StorageError::NotFound(format!("blob {id}")))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Remove both the blob and its metadata, and clear the hash index entry
    /// pointing at it.
    pub fn delete(&self, id: &BlobId) -> Result<()> {
        let meta = self.metadata(id)?;
        let (blob_path, meta_path) = paths::blob_paths(&self.root, id.as_str());
        let _ = fs::remove_file(&blob_path);
        let _ = fs::remove_file(&meta_path);
        self.hash_index.remove(&meta.hash);
        self.rewrite_index()
    }

    fn rewrite_index(&self) -> Result<()> {
        let path = paths::blob_index_path(&self.root);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&path)?;
        for entry in self.hash_index.iter() {
            let line = serde_json::to_string(&(entry.key(), entry.value().as_str()))?;
            writeln!(file, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_is_idempotent_on_duplicate_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path()).unwrap();
        let id1 = store.save(b"hello", "text/plain").unwrap();
        let id2 = store.save(b"hello", "text/plain").unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path()).unwrap();
        let id = store.save(b"payload", "application/octet-stream").unwrap();
        assert_eq!(store.load(&id).unwrap(), b"payload");
        assert_eq!(store.metadata(&id).unwrap().size, 7);
    }

    #[test]
    fn delete_removes_blob_meta_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path()).unwrap();
        let id = store.save(b"bye", "text/plain").unwrap();
        store.delete(&id).unwrap();
        assert!(store.load(&id).is_err());
        assert!(store.metadata(&id).is_err());

        // A re-save of the same bytes after deletion gets a fresh ID.
        let id2 = store.save(b"bye", "text/plain").unwrap();
        assert_ne!(id, id2);
    }

    #[test]
    fn index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = BlobStore::new(dir.path()).unwrap();
            store.save(b"persisted", "text/plain").unwrap()
        };
        let store2 = BlobStore::new(dir.path()).unwrap();
        let id2 = store2.save(b"persisted", "text/plain").unwrap();
        assert_eq!(id, id2);
    }
}
