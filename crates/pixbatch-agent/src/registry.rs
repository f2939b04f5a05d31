use std::collections::HashMap;
use std::sync::Arc;

use pixbatch_core::error::{PixbatchError, Result};
use pixbatch_core::traits::Tool;
use pixbatch_core::types::{ToolContext, ToolDefinition, ToolResult};

/// Registry of tools available to the agent.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: impl Tool) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Get tool definitions for the planner, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Execute a tool by name.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| PixbatchError::ToolNotFound(name.to_string()))?;

        let timeout = std::time::Duration::from_secs(tool.timeout_secs());

        match tokio::time::timeout(timeout, tool.execute(input, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(PixbatchError::ToolTimeout {
                tool: name.to_string(),
                timeout_secs: tool.timeout_secs(),
            }),
        }
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
    use crate::gate::{BulkGenerateTool, ConfirmationGate, BULK_TOOL};
    use pixbatch_core::types::SessionId;

    fn ctx() -> ToolContext {
        ToolContext::new(SessionId::new(), "e-1", "call-1")
    }

    #[tokio::test]
    async fn executes_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(BulkGenerateTool::new(ConfirmationGate::new(4), 100));

        assert_eq!(registry.definitions().len(), 1);
        assert_eq!(registry.definitions()[0].name, BULK_TOOL);

        let result = registry
            .execute(BULK_TOOL, serde_json::json!({"bulk_size": 2}), ctx())
            .await
            .unwrap();
        assert_eq!(result.response["status"], "success");
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error() {
        let registry = ToolRegistry::default();
        let result = registry.execute("nope", serde_json::json!({}), ctx()).await;
        assert!(matches!(result, Err(PixbatchError::ToolNotFound(_))));
    }

    #[test]
    fn registering_same_name_replaces_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(BulkGenerateTool::new(ConfirmationGate::new(4), 100));
        registry.register(BulkGenerateTool::new(ConfirmationGate::new(8), 50));
        assert_eq!(registry.definitions().len(), 1);
        assert!(registry.get(BULK_TOOL).is_some());
    }
}
