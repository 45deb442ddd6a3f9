//! Exact-substring file editing tool.

use crate::{parse_args, Tool, ToolContext, ToolOutput, ToolResult};
use async_trait::async_trait;
use backplane_core::Backend;
use serde::Deserialize;
use serde_json::{json, Value};
use similar::TextDiff;

#[derive(Debug, Deserialize)]
struct EditParams {
    path: String,
    old_string: String,
    new_string: String,
    #[serde(default)]
    replace_all: bool,
}

pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn id(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace an exact string in a file. The string must occur exactly once \
         unless replace_all is set; widen the match with surrounding context if \
         it is ambiguous."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Absolute path of the file" },
                "old_string": { "type": "string", "description": "Exact text to replace" },
                "new_string": { "type": "string", "description": "Replacement text" },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace every occurrence, defaults to false"
                }
            },
            "required": ["path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let params: EditParams = parse_args(args)?;

        let before = ctx.backend.read(&params.path, 0, usize::MAX).await?;
        let result = ctx
            .backend
            .edit(
                &params.path,
                &params.old_string,
                &params.new_string,
                params.replace_all,
            )
            .await?;
        let after = ctx.backend.read(&params.path, 0, usize::MAX).await?;

        let diff = TextDiff::from_lines(&before, &after)
            .unified_diff()
            .context_radius(3)
            .header(&result.path, &result.path)
            .to_string();

        Ok(ToolOutput::new(
            result.path.clone(),
            format!(
                "Replaced {} occurrence{} in {}\n{diff}",
                result.replacements,
                if result.replacements == 1 { "" } else { "s" },
                result.path
            ),
        )
        .with_metadata(json!({ "replacements": result.replacements })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::context;
    use backplane_core::{Backend, BackendError};

    #[tokio::test]
    async fn test_edit_shows_diff() {
        let ctx = context();
        ctx.backend.write("/f", "alpha\nbeta\ngamma").await.unwrap();

        let output = EditFileTool
            .execute(
                json!({ "path": "/f", "old_string": "beta", "new_string": "BETA" }),
                &ctx,
            )
            .await
            .unwrap();
        assert!(output.output.contains("Replaced 1 occurrence in /f"));
        assert!(output.output.contains("-beta"));
        assert!(output.output.contains("+BETA"));
    }

    #[tokio::test]
    async fn test_ambiguous_edit_propagates() {
        let ctx = context();
        ctx.backend.write("/f", "x x").await.unwrap();

        let err = EditFileTool
            .execute(
                json!({ "path": "/f", "old_string": "x", "new_string": "y" }),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::ToolError::Backend(BackendError::AmbiguousEdit { .. })
        ));
    }
}
