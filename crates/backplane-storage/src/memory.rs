//! In-memory store implementation for testing.

use crate::{Store, StoreEntry, StoreError, StoreRecord, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// In-memory store for testing.
///
/// This stores all records in memory and is not persistent.
pub struct MemoryStore {
    namespaces: RwLock<HashMap<String, BTreeMap<String, StoreRecord>>>,
}

impl MemoryStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self {
            namespaces: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, namespace: &str, path: &str) -> StoreResult<Option<StoreRecord>> {
        let namespaces = self
            .namespaces
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        Ok(namespaces
            .get(namespace)
            .and_then(|records| records.get(path))
            .cloned())
    }

    async fn put(&self, namespace: &str, path: &str, bytes: &[u8]) -> StoreResult<()> {
        let mut namespaces = self
            .namespaces
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        namespaces.entry(namespace.to_string()).or_default().insert(
            path.to_string(),
            StoreRecord {
                bytes: bytes.to_vec(),
                modified_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete(&self, namespace: &str, path: &str) -> StoreResult<()> {
        let mut namespaces = self
            .namespaces
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        if let Some(records) = namespaces.get_mut(namespace) {
            records.remove(path);
        }
        Ok(())
    }

    async fn list(&self, namespace: &str) -> StoreResult<Vec<StoreEntry>> {
        let namespaces = self
            .namespaces
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        let entries = namespaces
            .get(namespace)
            .map(|records| {
                records
                    .iter()
                    .map(|(path, record)| StoreEntry {
                        path: path.clone(),
                        size: record.bytes.len() as u64,
                        modified_at: record.modified_at,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();

        store.put("ns", "/notes.txt", b"hello").await.unwrap();

        let record = store.get("ns", "/notes.txt").await.unwrap().unwrap();
        assert_eq!(record.bytes, b"hello");

        assert!(store.exists("ns", "/notes.txt").await.unwrap());
        assert!(!store.exists("ns", "/other.txt").await.unwrap());

        store.delete("ns", "/notes.txt").await.unwrap();
        assert!(!store.exists("ns", "/notes.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_store_namespace_isolation() {
        let store = MemoryStore::new();

        store.put("a", "/f.txt", b"x").await.unwrap();
        assert!(store.get("b", "/f.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_list_sorted() {
        let store = MemoryStore::new();

        store.put("ns", "/b.txt", b"2").await.unwrap();
        store.put("ns", "/a.txt", b"1").await.unwrap();

        let entries = store.list("ns").await.unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/a.txt", "/b.txt"]);
        assert_eq!(entries[0].size, 1);
    }

    #[tokio::test]
    async fn test_memory_store_delete_missing_ok() {
        let store = MemoryStore::new();
        store.delete("ns", "/missing").await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_store_overwrite() {
        let store = MemoryStore::new();

        store.put("ns", "/f", b"first").await.unwrap();
        store.put("ns", "/f", b"second").await.unwrap();

        let record = store.get("ns", "/f").await.unwrap().unwrap();
        assert_eq!(record.bytes, b"second");
    }
}
