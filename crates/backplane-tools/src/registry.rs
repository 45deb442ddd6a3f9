//! Tool registry.

use crate::BoxedTool;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, BoxedTool>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Create a registry with all built-in tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::ls::LsTool));
        registry.register(Arc::new(crate::read::ReadFileTool));
        registry.register(Arc::new(crate::write::WriteFileTool));
        registry.register(Arc::new(crate::edit::EditFileTool));
        registry.register(Arc::new(crate::grep::GrepTool));
        registry.register(Arc::new(crate::glob::GlobTool));
        registry.register(Arc::new(crate::execute::ExecuteTool));
        registry
    }

    /// Register a tool.
    pub fn register(&mut self, tool: BoxedTool) {
        self.tools.insert(tool.id().to_string(), tool);
    }

    /// Get a tool by ID.
    pub fn get(&self, id: &str) -> Option<&BoxedTool> {
        self.tools.get(id)
    }

    /// List all tool IDs, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    /// Get all tools.
    pub fn all(&self) -> impl Iterator<Item = &BoxedTool> {
        self.tools.values()
    }

    /// Declarations for the model: name, description and parameter schema
    /// per tool, sorted by name for a stable prompt.
    pub fn declarations(&self) -> Vec<Value> {
        let mut tools: Vec<&BoxedTool> = self.tools.values().collect();
        tools.sort_by_key(|t| t.id());
        tools
            .into_iter()
            .map(|tool| {
                json!({
                    "name": tool.id(),
                    "description": tool.description(),
                    "parameters": tool.parameters_schema(),
                })
            })
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let registry = ToolRegistry::with_builtins();
        assert_eq!(
            registry.list(),
            vec!["edit_file", "execute", "glob", "grep", "ls", "read_file", "write_file"]
        );
    }

    #[test]
    fn test_declarations_are_schemas() {
        let registry = ToolRegistry::with_builtins();
        let declarations = registry.declarations();
        assert_eq!(declarations.len(), 7);
        let read = declarations
            .iter()
            .find(|d| d["name"] == "read_file")
            .unwrap();
        assert_eq!(read["parameters"]["type"], "object");
        assert!(read["parameters"]["required"]
            .as_array()
            .unwrap()
            .contains(&json!("path")));
    }

    #[test]
    fn test_get_unknown_is_none() {
        let registry = ToolRegistry::with_builtins();
        assert!(registry.get("nope").is_none());
    }
}
