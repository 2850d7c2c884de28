//! String key-value persistence for locally stored content records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::{debug, info};

/// `blob_<id>` entry: where the bytes live and what they are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRecord {
    pub url: String,
    pub name: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub size: u64,
    pub timestamp: u64,
}

/// `meta_<id>` entry, kept alongside the blob record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub size: u64,
    pub timestamp: u64,
    pub storage: String,
}

pub fn blob_key(id: &str) -> String {
    format!("blob_{id}")
}

pub fn meta_key(id: &str) -> String {
    format!("meta_{id}")
}

/// Small string store, shared by the resolver and the local-blob backend.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, crate::Error>;
    fn set(&self, key: &str, value: &str) -> Result<(), crate::Error>;
}

/// Process-local store.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, crate::Error> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), crate::Error> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// JSON-file store. The whole map is rewritten on every `set`.
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store, loading existing entries if the file exists.
    pub fn open(path: PathBuf) -> Result<Self, crate::Error> {
        let entries = if path.exists() {
            let data = std::fs::read(&path)
                .map_err(|e| crate::Error::Storage(format!("Failed to read store: {e}")))?;
            let map: BTreeMap<String, String> = serde_json::from_slice(&data)
                .map_err(|e| crate::Error::Storage(format!("Failed to parse store: {e}")))?;
            info!(path = %path.display(), count = map.len(), "Key-value store loaded");
            map
        } else {
            info!(path = %path.display(), "No key-value store found, starting fresh");
            BTreeMap::new()
        };
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), crate::Error> {
        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| crate::Error::Storage(format!("Failed to serialize store: {e}")))?;

        // Atomic write: tmp + rename
        let tmp = self.path.with_extension("tmp");
        if let Some(parent) = tmp.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                crate::Error::Storage(format!("Failed to create store directory: {e}"))
            })?;
        }
        std::fs::write(&tmp, &json)
            .map_err(|e| crate::Error::Storage(format!("Failed to write store: {e}")))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| crate::Error::Storage(format!("Failed to rename store: {e}")))?;

        debug!(path = %self.path.display(), count = entries.len(), "Key-value store saved");
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, crate::Error> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), crate::Error> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let previous = entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist(&entries) {
            // Keep memory and disk in agreement.
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_get_set() {
        let store = MemoryStore::new();
        assert_eq!(store.get("blob_1").unwrap(), None);
        store.set("blob_1", "{}").unwrap();
        assert_eq!(store.get("blob_1").unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = FileStore::open(path.clone()).unwrap();
        store.set("meta_1", r#"{"storage":"blob"}"#).unwrap();
        drop(store);

        let reopened = FileStore::open(path.clone()).unwrap();
        assert_eq!(
            reopened.get("meta_1").unwrap().as_deref(),
            Some(r#"{"storage":"blob"}"#)
        );
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            FileStore::open(path),
            Err(crate::Error::Storage(_))
        ));
    }
}
