//! File writing tool.

use crate::{parse_args, Tool, ToolContext, ToolOutput, ToolResult};
use async_trait::async_trait;
use backplane_core::Backend;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct WriteParams {
    path: String,
    content: String,
}

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn id(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file with the given content."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Absolute path of the file" },
                "content": { "type": "string", "description": "Full new file content" }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let params: WriteParams = parse_args(args)?;
        let result = ctx.backend.write(&params.path, &params.content).await?;
        debug!(session = %ctx.session_id, path = %result.path, "File written");

        let verb = if result.created { "Created" } else { "Updated" };
        Ok(ToolOutput::new(
            result.path.clone(),
            format!("{verb} {} ({} bytes)", result.path, result.bytes_written),
        )
        .with_metadata(json!({
            "created": result.created,
            "bytes": result.bytes_written,
        })))
    }
}
