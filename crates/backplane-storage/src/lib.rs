//! Durable key-value store backing the backplane persistent backend.
//!
//! Records are keyed by a stable namespace (one per agent/assistant) plus a
//! canonical virtual path. Two implementations are provided:
//! - JSON file storage (default, survives process restart)
//! - In-memory storage (for testing)

pub mod error;
pub mod json;
pub mod memory;

pub use error::{StoreError, StoreResult};
pub use json::JsonStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A stored file record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRecord {
    /// Raw file content.
    pub bytes: Vec<u8>,
    /// Last modification time.
    pub modified_at: DateTime<Utc>,
}

/// Listing entry for a stored record, without its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    /// Canonical virtual path of the record within its namespace.
    pub path: String,
    /// Content size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified_at: DateTime<Utc>,
}

/// A trait for namespaced key-value storage backends.
///
/// Paths are canonical virtual paths (see `backplane_util::vpath`); the
/// store treats them as opaque keys and never interprets `..` or `.`.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read a record. Returns `None` if the key doesn't exist.
    async fn get(&self, namespace: &str, path: &str) -> StoreResult<Option<StoreRecord>>;

    /// Write a record, creating or overwriting it.
    async fn put(&self, namespace: &str, path: &str, bytes: &[u8]) -> StoreResult<()>;

    /// Remove a record. Removing a missing key is not an error.
    async fn delete(&self, namespace: &str, path: &str) -> StoreResult<()>;

    /// List every record in a namespace, sorted by path.
    async fn list(&self, namespace: &str) -> StoreResult<Vec<StoreEntry>>;

    /// Check if a key exists.
    async fn exists(&self, namespace: &str, path: &str) -> StoreResult<bool> {
        Ok(self.get(namespace, path).await?.is_some())
    }
}
