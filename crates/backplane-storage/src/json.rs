//! JSON file-based store implementation.
//!
//! Each record is stored as its own JSON file under
//! `<base>/<namespace>/<virtual path>.json`, with the content carried as a
//! base64 field so arbitrary bytes survive the JSON encoding.

use crate::{Store, StoreEntry, StoreError, StoreRecord, StoreResult};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

/// JSON file-based store.
#[derive(Clone)]
pub struct JsonStore {
    base_path: PathBuf,
}

/// On-disk record shape.
#[derive(Debug, Serialize, Deserialize)]
struct DiskRecord {
    modified_at: DateTime<Utc>,
    content_b64: String,
}

impl JsonStore {
    /// Create a new JSON store rooted at the given base path.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Create a JSON store under the platform data directory.
    pub fn default_location(app: &str) -> Option<Self> {
        dirs::data_local_dir().map(|dir| Self::new(dir.join(app).join("store")))
    }

    /// Map a (namespace, virtual path) key to a file path.
    fn key_to_file(&self, namespace: &str, path: &str) -> StoreResult<PathBuf> {
        if namespace.is_empty() || namespace.contains('/') || namespace.contains('\\') {
            return Err(StoreError::invalid_key(format!(
                "invalid namespace: {namespace:?}"
            )));
        }

        let mut file = self.base_path.join(namespace);
        for segment in path.split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Err(StoreError::invalid_key(format!(
                        "key path {path:?} contains '..'"
                    )))
                }
                other => file.push(other),
            }
        }

        let name = file
            .file_name()
            .ok_or_else(|| StoreError::invalid_key("key path cannot be empty"))?
            .to_string_lossy()
            .into_owned();
        file.set_file_name(format!("{name}.json"));
        Ok(file)
    }

    /// Recover the virtual path from a file path under a namespace dir.
    fn file_to_key(namespace_dir: &Path, file: &Path) -> Option<String> {
        let relative = file.strip_prefix(namespace_dir).ok()?;
        let mut segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let last = segments.pop()?;
        segments.push(last.strip_suffix(".json")?.to_string());
        Some(format!("/{}", segments.join("/")))
    }
}

#[async_trait]
impl Store for JsonStore {
    async fn get(&self, namespace: &str, path: &str) -> StoreResult<Option<StoreRecord>> {
        let file = self.key_to_file(namespace, path)?;
        debug!(file = %file.display(), "Reading store record");

        let content = match fs::read_to_string(&file).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(e)),
        };

        let record: DiskRecord = serde_json::from_str(&content)?;
        let bytes = BASE64
            .decode(&record.content_b64)
            .map_err(|e| StoreError::corrupt(path, e.to_string()))?;

        Ok(Some(StoreRecord {
            bytes,
            modified_at: record.modified_at,
        }))
    }

    async fn put(&self, namespace: &str, path: &str, bytes: &[u8]) -> StoreResult<()> {
        let file = self.key_to_file(namespace, path)?;
        debug!(file = %file.display(), size = bytes.len(), "Writing store record");

        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).await?;
        }

        let record = DiskRecord {
            modified_at: Utc::now(),
            content_b64: BASE64.encode(bytes),
        };
        let content = serde_json::to_string_pretty(&record)?;

        // Write atomically (write to temp file, then rename)
        let temp = file.with_extension("json.tmp");
        fs::write(&temp, &content).await?;
        fs::rename(&temp, &file).await?;

        Ok(())
    }

    async fn delete(&self, namespace: &str, path: &str) -> StoreResult<()> {
        let file = self.key_to_file(namespace, path)?;
        debug!(file = %file.display(), "Removing store record");

        match fs::remove_file(&file).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn list(&self, namespace: &str) -> StoreResult<Vec<StoreEntry>> {
        let namespace_dir = self.base_path.join(namespace);
        if !namespace_dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(&namespace_dir).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            if !entry.path().extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            let Some(path) = Self::file_to_key(&namespace_dir, entry.path()) else {
                continue;
            };

            let content = fs::read_to_string(entry.path()).await?;
            let record: DiskRecord = serde_json::from_str(&content)?;
            let size = BASE64
                .decode(&record.content_b64)
                .map_err(|e| StoreError::corrupt(&path, e.to_string()))?
                .len() as u64;

            entries.push(StoreEntry {
                path,
                size,
                modified_at: record.modified_at,
            });
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_json_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path());

        store
            .put("agent", "/memories/a.md", b"remember this")
            .await
            .unwrap();

        let record = store.get("agent", "/memories/a.md").await.unwrap().unwrap();
        assert_eq!(record.bytes, b"remember this");
    }

    #[tokio::test]
    async fn test_json_store_binary_content() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path());

        let bytes = [0u8, 159, 146, 150, 255];
        store.put("agent", "/bin.dat", &bytes).await.unwrap();

        let record = store.get("agent", "/bin.dat").await.unwrap().unwrap();
        assert_eq!(record.bytes, bytes);
    }

    #[tokio::test]
    async fn test_json_store_survives_reopen() {
        let dir = TempDir::new().unwrap();

        {
            let store = JsonStore::new(dir.path());
            store.put("agent", "/keep.txt", b"durable").await.unwrap();
        }

        let store = JsonStore::new(dir.path());
        let record = store.get("agent", "/keep.txt").await.unwrap().unwrap();
        assert_eq!(record.bytes, b"durable");
    }

    #[tokio::test]
    async fn test_json_store_list_nested() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path());

        store.put("agent", "/a.md", b"1").await.unwrap();
        store.put("agent", "/sub/b.md", b"22").await.unwrap();

        let entries = store.list("agent").await.unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/a.md", "/sub/b.md"]);
        assert_eq!(entries[1].size, 2);
    }

    #[tokio::test]
    async fn test_json_store_list_missing_namespace() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path());
        assert!(store.list("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_json_store_rejects_traversal_key() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path());

        let result = store.put("agent", "/../escape", b"x").await;
        assert!(matches!(result, Err(StoreError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_json_store_rejects_bad_namespace() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::new(dir.path());

        let result = store.put("a/b", "/f", b"x").await;
        assert!(matches!(result, Err(StoreError::InvalidKey(_))));
    }
}
