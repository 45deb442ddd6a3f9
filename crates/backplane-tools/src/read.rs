//! File reading tool with line-numbered output.

use crate::{parse_args, Tool, ToolContext, ToolOutput, ToolResult};
use async_trait::async_trait;
use backplane_core::{Backend, DEFAULT_READ_LIMIT};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct ReadParams {
    path: String,
    #[serde(default)]
    offset: usize,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_READ_LIMIT
}

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn id(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file, returning numbered lines. Use offset and limit to page through large files."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Absolute path of the file" },
                "offset": {
                    "type": "integer",
                    "description": "0-based first line to read, defaults to 0"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines, defaults to 2000"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let params: ReadParams = parse_args(args)?;
        let content = ctx
            .backend
            .read(&params.path, params.offset, params.limit)
            .await?;

        if content.is_empty() {
            return Ok(ToolOutput::new(params.path, "(no lines in range)"));
        }

        let numbered: Vec<String> = content
            .lines()
            .enumerate()
            .map(|(i, line)| format!("{:>6}\t{line}", params.offset + i + 1))
            .collect();

        let line_count = numbered.len();
        Ok(ToolOutput::new(params.path, numbered.join("\n"))
            .with_metadata(json!({ "lines": line_count, "offset": params.offset })))
    }
}
