//! Content search tool.

use crate::{parse_args, Tool, ToolContext, ToolOutput, ToolResult};
use async_trait::async_trait;
use backplane_core::Backend;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct GrepParams {
    pattern: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    glob: Option<String>,
}

pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn id(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search file contents with a regular expression, optionally scoped to a \
         path and filtered by a filename glob."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Regular expression to search for" },
                "path": { "type": "string", "description": "Directory to search under, defaults to /" },
                "glob": { "type": "string", "description": "Filename filter, e.g. *.rs" }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let params: GrepParams = parse_args(args)?;
        let matches = ctx
            .backend
            .grep(
                &params.pattern,
                params.path.as_deref(),
                params.glob.as_deref(),
            )
            .await?;

        if matches.is_empty() {
            return Ok(ToolOutput::new(
                params.pattern,
                "No matches found".to_string(),
            ));
        }

        let lines: Vec<String> = matches
            .iter()
            .map(|m| format!("{}:{}: {}", m.path, m.line_number, m.text))
            .collect();

        Ok(
            ToolOutput::new(params.pattern, lines.join("\n"))
                .with_metadata(json!({ "matches": matches.len() })),
        )
    }
}
