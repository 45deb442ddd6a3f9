//! Store error types.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error (permission denied, disk full, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Stored record is corrupt (bad encoding, missing fields)
    #[error("corrupt record at '{path}': {message}")]
    Corrupt { path: String, message: String },

    /// Invalid key format
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Lock was poisoned (another thread panicked while holding the lock)
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

impl StoreError {
    /// Create a corrupt record error.
    pub fn corrupt(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid key error.
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_corrupt_formats() {
        let err = StoreError::corrupt("/memories/a.md", "bad base64");
        assert_eq!(
            err.to_string(),
            "corrupt record at '/memories/a.md': bad base64"
        );
    }

    #[test]
    fn store_error_invalid_key_formats() {
        let err = StoreError::invalid_key("empty namespace");
        assert_eq!(err.to_string(), "invalid key: empty namespace");
    }

    #[test]
    fn store_error_io_wraps() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = StoreError::from(io_err);
        assert!(err.to_string().contains("IO error"));
    }
}
