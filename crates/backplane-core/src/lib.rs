//! Backend protocol, storage backends and path-prefix router for backplane.
//!
//! Every agent-visible file operation goes through the [`Backend`] trait:
//! a uniform contract over wildly different physical substrates — an
//! in-memory tree, a durable key-value store, the real filesystem, or a
//! remote sandbox reached over RPC. Backends that can also run commands
//! implement the [`Sandbox`] extension; call sites narrow with
//! [`Backend::as_sandbox`] instead of probing.
//!
//! The [`CompositeBackend`] presents one virtual `/` namespace while
//! routing each operation to the owning backend by longest matching path
//! prefix, re-prefixing any paths embedded in results on the way back.
//!
//! # Example
//!
//! ```rust
//! use backplane_core::{Backend, CompositeBackend, MemoryBackend, StoreBackend};
//! use backplane_storage::MemoryStore;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! let composite = CompositeBackend::builder(Arc::new(MemoryBackend::new()))
//!     .route("/memories", Arc::new(StoreBackend::new(store, "agent")))
//!     .build()?;
//!
//! composite.write("/notes.txt", "scratch").await?;
//! composite.write("/memories/a.md", "durable").await?;
//! # Ok(())
//! # }
//! ```

pub mod composite;
pub mod error;
pub mod local;
pub mod memory;
pub mod ops;
pub mod store;

pub use composite::{CompositeBackend, CompositeBuilder};
pub use error::{BackendError, BackendResult};
pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use store::StoreBackend;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default number of lines returned by `read` when no limit is given.
///
/// Callers page through larger files with advancing offsets; the cap keeps
/// a single tool result from flooding the model context.
pub const DEFAULT_READ_LIMIT: usize = 2000;

/// Maximum characters kept per grep match line before truncation.
pub const MAX_GREP_LINE_LEN: usize = 512;

/// A listing/glob entry. A read-only projection, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Canonical, absolute virtual path.
    pub path: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Size in bytes (files only).
    pub size: Option<u64>,
    /// Last modification time, when the substrate tracks one.
    pub modified_at: Option<DateTime<Utc>>,
}

impl FileInfo {
    /// Create a file entry.
    pub fn file(path: impl Into<String>, size: u64, modified_at: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
            size: Some(size),
            modified_at: Some(modified_at),
        }
    }

    /// Create a directory entry.
    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
            size: None,
            modified_at: None,
        }
    }

    /// Rebuild this entry with its path placed under a route prefix.
    ///
    /// Field-by-field reconstruction so nothing is silently dropped when
    /// the record grows.
    pub fn with_prefix(&self, prefix: &str) -> Self {
        Self {
            path: join_prefix(prefix, &self.path),
            is_dir: self.is_dir,
            size: self.size,
            modified_at: self.modified_at,
        }
    }
}

/// A single content-search match. Ephemeral, produced per search call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrepMatch {
    /// Canonical virtual path of the matching file.
    pub path: String,
    /// 1-based line number.
    pub line_number: usize,
    /// The matching line, possibly truncated.
    pub text: String,
}

impl GrepMatch {
    /// Rebuild this match with its path placed under a route prefix.
    pub fn with_prefix(&self, prefix: &str) -> Self {
        Self {
            path: join_prefix(prefix, &self.path),
            line_number: self.line_number,
            text: self.text.clone(),
        }
    }
}

/// Result of a `write` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    /// Canonical virtual path written.
    pub path: String,
    /// True if the file did not exist before.
    pub created: bool,
    /// Bytes written.
    pub bytes_written: u64,
}

/// Result of an `edit` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditResult {
    /// Canonical virtual path edited.
    pub path: String,
    /// Number of occurrences replaced.
    pub replacements: usize,
}

/// Result of one `execute` call in a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResult {
    /// Interleaved stdout+stderr of the command.
    pub output: String,
    /// Process exit code.
    pub exit_code: i32,
    /// True if the output was cut at the byte budget.
    pub truncated: bool,
}

impl ExecuteResult {
    /// Check whether the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Per-file outcome of a bulk `upload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    /// Canonical virtual path of the uploaded file.
    pub path: String,
    /// Error message if this file failed; `None` on success.
    pub error: Option<String>,
}

/// Per-file outcome of a bulk `download`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    /// Canonical virtual path requested.
    pub path: String,
    /// File content on success.
    pub bytes: Option<Vec<u8>>,
    /// Error message if this file failed.
    pub error: Option<String>,
}

/// The file-operation capability contract every backend implements.
///
/// All path arguments are normalized at the boundary; implementations call
/// [`backplane_util::vpath::normalize`] before touching storage. Operations
/// are safe to invoke concurrently from multiple tasks against the same
/// instance; the minimum guarantee is per-path atomicity (a concurrent
/// `read` never observes a partially applied `write`).
#[async_trait]
pub trait Backend: Send + Sync {
    /// List direct children of a path, sorted by path.
    ///
    /// Listing a nonexistent path is not an error; it returns an empty
    /// sequence.
    async fn list(&self, path: &str) -> BackendResult<Vec<FileInfo>>;

    /// Read a window of lines from a file.
    ///
    /// `offset` is the 0-based first line; `limit` caps the number of
    /// lines returned. Callers page via repeated calls with advancing
    /// offsets for large files.
    async fn read(&self, path: &str, offset: usize, limit: usize) -> BackendResult<String>;

    /// Create or overwrite a file.
    async fn write(&self, path: &str, content: &str) -> BackendResult<WriteResult>;

    /// Replace an exact substring in a file.
    ///
    /// Fails with `StringNotFound` if `old_string` does not occur and with
    /// `AmbiguousEdit` if it occurs more than once while `replace_all` is
    /// false, forcing the caller to widen the match.
    async fn edit(
        &self,
        path: &str,
        old_string: &str,
        new_string: &str,
        replace_all: bool,
    ) -> BackendResult<EditResult>;

    /// Remove a file. Not every backend exposes deletion.
    async fn delete(&self, path: &str) -> BackendResult<()> {
        let _ = path;
        Err(BackendError::unsupported("delete"))
    }

    /// Search file contents by regex, optionally scoped to a path and
    /// filtered by a glob over file paths. Matches are sorted by path and
    /// line number. No matches is an empty vector, not an error.
    async fn grep(
        &self,
        pattern: &str,
        path: Option<&str>,
        glob: Option<&str>,
    ) -> BackendResult<Vec<GrepMatch>>;

    /// Find files matching a glob pattern under a path, sorted by path.
    async fn glob(&self, pattern: &str, path: &str) -> BackendResult<Vec<FileInfo>>;

    /// Narrow to the sandbox capability if this backend supports command
    /// execution. Call sites must check rather than probe.
    fn as_sandbox(&self) -> Option<&dyn Sandbox> {
        None
    }
}

/// Extension of [`Backend`] for substrates that can run shell commands and
/// transfer files in bulk.
#[async_trait]
pub trait Sandbox: Backend {
    /// Stable identifier of the running sandbox instance, used for
    /// reattachment/reuse across calls.
    fn id(&self) -> &str;

    /// Execute a shell command, returning interleaved output and exit
    /// code. Timeouts surface as `BackendError::Timeout`; they are never
    /// auto-retried because re-running an arbitrary command risks
    /// duplicate side effects.
    async fn execute(&self, command: &str) -> BackendResult<ExecuteResult>;

    /// Upload files in bulk. Per-file failures are reported in the
    /// results rather than aborting the batch.
    async fn upload(&self, files: &[(String, Vec<u8>)]) -> BackendResult<Vec<UploadResult>>;

    /// Download files in bulk. Per-file failures are reported in the
    /// results rather than aborting the batch.
    async fn download(&self, paths: &[String]) -> BackendResult<Vec<DownloadResult>>;
}

/// A shared, dynamically dispatched backend.
pub type SharedBackend = Arc<dyn Backend>;

/// Join a route prefix and a canonical sub-path.
pub(crate) fn join_prefix(prefix: &str, path: &str) -> String {
    if path == "/" {
        prefix.to_string()
    } else {
        format!("{prefix}{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_info_with_prefix() {
        let info = FileInfo::file("/a.md", 3, Utc::now());
        let prefixed = info.with_prefix("/memories");
        assert_eq!(prefixed.path, "/memories/a.md");
        assert_eq!(prefixed.size, Some(3));
        assert!(!prefixed.is_dir);
    }

    #[test]
    fn test_with_prefix_root() {
        let info = FileInfo::dir("/");
        assert_eq!(info.with_prefix("/memories").path, "/memories");
    }

    #[test]
    fn test_grep_match_with_prefix() {
        let m = GrepMatch {
            path: "/notes/a.txt".to_string(),
            line_number: 3,
            text: "hit".to_string(),
        };
        assert_eq!(m.with_prefix("/mem").path, "/mem/notes/a.txt");
        assert_eq!(m.with_prefix("/mem").line_number, 3);
    }

    #[test]
    fn test_execute_result_success() {
        let ok = ExecuteResult {
            output: String::new(),
            exit_code: 0,
            truncated: false,
        };
        assert!(ok.success());
        let fail = ExecuteResult {
            output: String::new(),
            exit_code: 2,
            truncated: false,
        };
        assert!(!fail.success());
    }
}
