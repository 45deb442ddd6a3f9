//! Tool error types.

use backplane_core::BackendError;
use thiserror::Error;

/// Result type for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Errors that can occur during tool execution.
///
/// Backend errors pass through unmodified; their messages carry the
/// structured detail (offending path, non-matching string) the model needs
/// to adjust its next call.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Invalid parameters.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A backend operation failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ToolError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
