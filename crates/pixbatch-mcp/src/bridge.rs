use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use rmcp::model::Tool as McpTool;

use pixbatch_agent::ToolRegistry;
use pixbatch_core::error::Result;
use pixbatch_core::traits::Tool;
use pixbatch_core::types::{ToolContext, ToolResult};

use crate::McpClientManager;

/// A tool served by an MCP server, registered under its own name.
pub struct McpBridgedTool {
    server_name: String,
    tool_name: String,
    description: String,
    schema: serde_json::Value,
    manager: Arc<McpClientManager>,
    timeout: u64,
}

impl Tool for McpBridgedTool {
    fn name(&self) -> &str {
        &self.tool_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> serde_json::Value {
        self.schema.clone()
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let arguments = input.as_object().cloned();
            debug!(server = %self.server_name, tool = %self.tool_name, "Calling MCP tool");

            match self
                .manager
                .call_tool(&self.server_name, &self.tool_name, arguments)
                .await
            {
                Ok(payload) => Ok(ToolResult::success(payload)),
                Err(e) => Ok(ToolResult::error(e.to_string())),
            }
        })
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout
    }
}

/// Register all tools from an MCP server into the tool registry.
pub fn register_mcp_tools(
    registry: &mut ToolRegistry,
    manager: &Arc<McpClientManager>,
    server_name: &str,
    tools: &[McpTool],
    timeout_secs: u64,
) {
    for tool in tools {
        let description = tool
            .description
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_else(|| format!("MCP tool: {}", tool.name));

        let schema = serde_json::to_value(&*tool.input_schema)
            .unwrap_or(serde_json::json!({"type": "object"}));

        if registry.get(&tool.name).is_some() {
            debug!(name = %tool.name, server = %server_name, "MCP tool shadows an existing tool");
        }

        registry.register(McpBridgedTool {
            server_name: server_name.to_string(),
            tool_name: tool.name.to_string(),
            description,
            schema,
            manager: manager.clone(),
            timeout: timeout_secs,
        });
        debug!(name = %tool.name, server = %server_name, "Registered MCP bridged tool");
    }
}
