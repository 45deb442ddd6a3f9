//! File pattern matching tool.

use crate::{parse_args, Tool, ToolContext, ToolOutput, ToolResult};
use async_trait::async_trait;
use backplane_core::Backend;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct GlobParams {
    pattern: String,
    #[serde(default = "default_path")]
    path: String,
}

fn default_path() -> String {
    "/".to_string()
}

pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn id(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files whose path matches a glob pattern, e.g. **/*.rs."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Glob pattern to match" },
                "path": { "type": "string", "description": "Directory to search under, defaults to /" }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let params: GlobParams = parse_args(args)?;
        let files = ctx.backend.glob(&params.pattern, &params.path).await?;

        if files.is_empty() {
            return Ok(ToolOutput::new(params.pattern, "No files found"));
        }

        let lines: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        Ok(ToolOutput::new(params.pattern, lines.join("\n"))
            .with_metadata(json!({ "count": files.len() })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::context;
    use backplane_core::Backend;

    #[tokio::test]
    async fn test_glob_lists_paths() {
        let ctx = context();
        ctx.backend.write("/a.md", "1").await.unwrap();
        ctx.backend.write("/src/b.rs", "2").await.unwrap();

        let output = GlobTool
            .execute(json!({ "pattern": "**/*.rs" }), &ctx)
            .await
            .unwrap();
        assert_eq!(output.output, "/src/b.rs");
    }

    #[tokio::test]
    async fn test_glob_no_files() {
        let ctx = context();
        let output = GlobTool
            .execute(json!({ "pattern": "*.zig" }), &ctx)
            .await
            .unwrap();
        assert_eq!(output.output, "No files found");
    }
}
