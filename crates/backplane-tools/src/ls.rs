//! Directory listing tool.

use crate::{parse_args, Tool, ToolContext, ToolOutput, ToolResult};
use async_trait::async_trait;
use backplane_core::Backend;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct LsParams {
    #[serde(default = "default_path")]
    path: String,
}

fn default_path() -> String {
    "/".to_string()
}

pub struct LsTool;

#[async_trait]
impl Tool for LsTool {
    fn id(&self) -> &str {
        "ls"
    }

    fn description(&self) -> &str {
        "List the files and directories at a path. Directories end with '/'."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute path to list, defaults to /"
                }
            }
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let params: LsParams = parse_args(args)?;
        let entries = ctx.backend.list(&params.path).await?;

        if entries.is_empty() {
            return Ok(ToolOutput::new(params.path, "(empty)"));
        }

        let mut lines = Vec::with_capacity(entries.len());
        for entry in &entries {
            if entry.is_dir {
                lines.push(format!("{}/", entry.path));
            } else {
                match entry.size {
                    Some(size) => lines.push(format!("{} ({size} bytes)", entry.path)),
                    None => lines.push(entry.path.clone()),
                }
            }
        }

        Ok(ToolOutput::new(params.path, lines.join("\n"))
            .with_metadata(json!({ "count": entries.len() })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::context;
    use backplane_core::Backend;

    #[tokio::test]
    async fn test_ls_formats_entries() {
        let ctx = context();
        ctx.backend.write("/a.txt", "abc").await.unwrap();
        ctx.backend.write("/sub/b.txt", "x").await.unwrap();

        let output = LsTool
            .execute(json!({ "path": "/" }), &ctx)
            .await
            .unwrap();
        assert!(output.output.contains("/a.txt (3 bytes)"));
        assert!(output.output.contains("/sub/"));
        assert!(output.output.contains("/memories/"));
    }

    #[tokio::test]
    async fn test_ls_empty() {
        let ctx = context();
        let output = LsTool
            .execute(json!({ "path": "/nothing" }), &ctx)
            .await
            .unwrap();
        assert_eq!(output.output, "(empty)");
    }
}
