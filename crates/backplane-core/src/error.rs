//! Error types for backend operations.
//!
//! Every kind carries enough structured detail (offending path, the
//! non-matching string, the missing capability) that an agent loop can
//! surface an actionable message to the driving model without re-deriving
//! context. Caller/input errors propagate unmodified; only timeouts and
//! provider outages are ever retried, and only for idempotent operations.

use backplane_util::VPathError;
use std::time::Duration;
use thiserror::Error;

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors that can occur during backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Malformed, traversing, or disallowed path. Never retryable.
    #[error("invalid path: {0}")]
    InvalidPath(#[from] VPathError),

    /// Path does not exist.
    #[error("file not found: {path}")]
    NotFound { path: String },

    /// Operation requires a file but the path names a directory.
    #[error("'{path}' is a directory")]
    IsDirectory { path: String },

    /// Path structurally collides with an existing file (e.g. writing
    /// `/a/b` when `/a` already exists as a file).
    #[error("path conflict at '{path}': {message}")]
    Conflict { path: String, message: String },

    /// Edit precondition failed: the old string does not occur.
    #[error("string not found in '{path}': {needle:?}")]
    StringNotFound { path: String, needle: String },

    /// Edit precondition failed: the old string occurs more than once and
    /// `replace_all` was not set.
    #[error("string occurs {count} times in '{path}': {needle:?}; widen the match or pass replace_all")]
    AmbiguousEdit {
        path: String,
        needle: String,
        count: usize,
    },

    /// Invalid search pattern (regex or glob) supplied by the caller.
    #[error("invalid pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Capability not supported by the resolved backend.
    #[error("operation '{operation}' is not supported by this backend")]
    Unsupported { operation: String },

    /// Composite backend misconfiguration, raised at construction only.
    #[error("invalid route: {message}")]
    InvalidRoute { message: String },

    /// Remote operation exceeded its time budget.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Sandbox cold start or connection failed after exhausting retries.
    #[error("provider '{provider}' unavailable: {message}")]
    ProviderUnavailable { provider: String, message: String },

    /// Remote command plumbing failure (transport-level, not a non-zero
    /// exit from the user's command).
    #[error("execution failed: {message}")]
    ExecFailed { message: String },

    /// Lock was poisoned (another thread panicked while holding the lock)
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// Local I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persistent store error.
    #[error("store error: {0}")]
    Store(#[from] backplane_storage::StoreError),
}

impl BackendError {
    /// Create a not-found error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create an is-directory error.
    pub fn is_directory(path: impl Into<String>) -> Self {
        Self::IsDirectory { path: path.into() }
    }

    /// Create a structural conflict error.
    pub fn conflict(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a string-not-found edit error. Long needles are truncated
    /// so the message stays readable.
    pub fn string_not_found(path: impl Into<String>, needle: &str) -> Self {
        Self::StringNotFound {
            path: path.into(),
            needle: truncate_needle(needle),
        }
    }

    /// Create an ambiguous-edit error.
    pub fn ambiguous_edit(path: impl Into<String>, needle: &str, count: usize) -> Self {
        Self::AmbiguousEdit {
            path: path.into(),
            needle: truncate_needle(needle),
            count,
        }
    }

    /// Create an invalid-pattern error.
    pub fn invalid_pattern(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Create an invalid-route error.
    pub fn invalid_route(message: impl Into<String>) -> Self {
        Self::InvalidRoute {
            message: message.into(),
        }
    }

    /// Create a provider-unavailable error.
    pub fn provider_unavailable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an execution-failed error.
    pub fn exec_failed(message: impl Into<String>) -> Self {
        Self::ExecFailed {
            message: message.into(),
        }
    }

    /// Check if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Check if this is a caller/input error that must surface unmodified
    /// and never be retried by the backend layer.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidPath(_)
                | Self::NotFound { .. }
                | Self::IsDirectory { .. }
                | Self::Conflict { .. }
                | Self::StringNotFound { .. }
                | Self::AmbiguousEdit { .. }
                | Self::InvalidPattern { .. }
                | Self::Unsupported { .. }
        )
    }
}

fn truncate_needle(needle: &str) -> String {
    const MAX: usize = 120;
    if needle.chars().count() <= MAX {
        needle.to_string()
    } else {
        let cut: String = needle.chars().take(MAX).collect();
        format!("{cut}...")
    }
}
