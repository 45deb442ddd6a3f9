//! Agent-facing tool surface for backplane.
//!
//! Each backend operation is exposed as a callable tool with a stable name
//! and a JSON-schema-described signature, consumed by an external
//! tool-calling layer that translates model-issued structured calls into
//! these exact parameter shapes.

pub mod error;
pub mod registry;

// Tool implementations
pub mod edit;
pub mod execute;
pub mod glob;
pub mod grep;
pub mod ls;
pub mod read;
pub mod write;

pub use error::{ToolError, ToolResult};
pub use registry::ToolRegistry;

use async_trait::async_trait;
use backplane_core::CompositeBackend;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Context provided to tools during execution.
pub struct ToolContext {
    /// Session ID, for log correlation.
    pub session_id: String,
    /// The routed backend all file and execution operations go through.
    pub backend: Arc<CompositeBackend>,
}

impl ToolContext {
    pub fn new(session_id: impl Into<String>, backend: Arc<CompositeBackend>) -> Self {
        Self {
            session_id: session_id.into(),
            backend,
        }
    }
}

/// Result of tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Title/summary of the operation.
    pub title: String,
    /// Output text returned to the model.
    pub output: String,
    /// Tool-specific metadata.
    pub metadata: Value,
}

impl ToolOutput {
    pub fn new(title: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            output: output.into(),
            metadata: Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// The main trait for tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable tool name, e.g. `read_file`.
    fn id(&self) -> &str;

    /// Description shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput>;
}

/// A boxed tool for dynamic dispatch.
pub type BoxedTool = Arc<dyn Tool>;

/// Deserialize tool arguments, reporting schema mismatches as validation
/// errors rather than opaque JSON failures.
pub(crate) fn parse_args<T: DeserializeOwned>(args: Value) -> ToolResult<T> {
    serde_json::from_value(args).map_err(|e| ToolError::validation(e.to_string()))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use backplane_core::MemoryBackend;

    pub fn context() -> ToolContext {
        let backend = CompositeBackend::builder(Arc::new(MemoryBackend::new()))
            .route("/memories", Arc::new(MemoryBackend::new()))
            .build()
            .unwrap();
        ToolContext::new("test-session", Arc::new(backend))
    }
}
