//! Command execution tool.

use crate::{parse_args, Tool, ToolContext, ToolOutput, ToolResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ExecuteParams {
    command: String,
}

pub struct ExecuteTool;

#[async_trait]
impl Tool for ExecuteTool {
    fn id(&self) -> &str {
        "execute"
    }

    fn description(&self) -> &str {
        "Run a shell command in the sandbox and return its output and exit code."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Shell command to run" }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let params: ExecuteParams = parse_args(args)?;
        debug!(session = %ctx.session_id, "Executing command");
        let result = ctx.backend.execute(&params.command).await?;

        let mut output = result.output.clone();
        if result.truncated {
            output.push_str("\n[output truncated]");
        }
        if !result.success() {
            output.push_str(&format!("\n[exit code {}]", result.exit_code));
        }

        Ok(ToolOutput::new(params.command, output).with_metadata(json!({
            "exit_code": result.exit_code,
            "truncated": result.truncated,
        })))
    }
}
