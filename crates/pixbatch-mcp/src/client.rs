use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use rmcp::model::{CallToolRequestParams, CallToolResult, Tool as McpTool};
use rmcp::service::RunningService;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransport;
use rmcp::{RoleClient, ServiceExt};

use pixbatch_core::config::{McpServerConfig, McpTransport};
use pixbatch_core::error::{PixbatchError, Result};

use crate::handler::PixbatchClientHandler;

type McpConnection = RunningService<RoleClient, PixbatchClientHandler>;

/// Connections to the MCP servers hosting generation tools.
#[derive(Default)]
pub struct McpClientManager {
    connections: Mutex<HashMap<String, McpConnection>>,
}

/// JSON form of a tool result, as recorded in the event log.
pub fn result_payload(result: &CallToolResult) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(result)?)
}

impl McpClientManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect to an MCP server.
    pub async fn connect(&self, name: &str, config: &McpServerConfig) -> Result<()> {
        let handler = PixbatchClientHandler::new(name);

        let client = match &config.transport {
            McpTransport::Stdio { command, args, env } => {
                let mut cmd = tokio::process::Command::new(command);
                cmd.args(args);
                for (k, v) in env {
                    cmd.env(k, v);
                }

                let transport = rmcp::transport::TokioChildProcess::new(cmd).map_err(|e| {
                    PixbatchError::Mcp(format!("Failed to spawn {}: {}", command, e))
                })?;

                handler.serve(transport).await.map_err(|e| {
                    PixbatchError::Mcp(format!("Failed to initialize MCP client for {}: {}", name, e))
                })?
            }
            McpTransport::Http { url } => {
                let transport = StreamableHttpClientTransport::from_uri(url.as_str());

                <PixbatchClientHandler as ServiceExt<RoleClient>>::serve(handler, transport)
                    .await
                    .map_err(|e| PixbatchError::Mcp(format!("MCP init for '{}' failed: {}", name, e)))?
            }
        };

        info!(server = %name, "MCP server connected");
        self.connections.lock().await.insert(name.to_string(), client);
        Ok(())
    }

    /// List tools from a connected server.
    pub async fn list_tools(&self, server_name: &str) -> Result<Vec<McpTool>> {
        let conns = self.connections.lock().await;
        let client = conns
            .get(server_name)
            .ok_or_else(|| PixbatchError::Mcp(format!("Server '{}' not connected", server_name)))?;

        let tools = client.list_all_tools().await.map_err(|e| {
            PixbatchError::Mcp(format!("Failed to list tools from '{}': {}", server_name, e))
        })?;

        debug!(server = %server_name, count = tools.len(), "Listed MCP tools");
        Ok(tools)
    }

    /// Call a tool, returning the full result as JSON.
    pub async fn call_tool(
        &self,
        server_name: &str,
        tool_name: &str,
        arguments: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<serde_json::Value> {
        let conns = self.connections.lock().await;
        let client = conns
            .get(server_name)
            .ok_or_else(|| PixbatchError::Mcp(format!("Server '{}' not connected", server_name)))?;

        let params = CallToolRequestParams {
            name: tool_name.to_string().into(),
            arguments,
            meta: None,
            task: None,
        };

        let result = client.call_tool(params).await.map_err(|e| {
            PixbatchError::Mcp(format!("Tool call '{}.{}' failed: {}", server_name, tool_name, e))
        })?;

        if result.is_error == Some(true) {
            warn!(server = %server_name, tool = %tool_name, "MCP tool reported an error");
        }
        result_payload(&result)
    }

    /// Disconnect from all servers.
    ///
    /// Every connection is closed even if some fail; the first failure is
    /// returned as [`PixbatchError::ShutdownRace`].
    pub async fn disconnect_all(&self) -> Result<()> {
        let mut conns = self.connections.lock().await;
        let mut first_failure = None;
        for (name, mut client) in conns.drain() {
            match client.close().await {
                Ok(reason) => info!(server = %name, ?reason, "MCP server disconnected"),
                Err(e) => {
                    debug!(server = %name, error = %e, "MCP transport closed uncleanly");
                    first_failure.get_or_insert_with(|| format!("{}: {}", name, e));
                }
            }
        }
        match first_failure {
            Some(message) => Err(PixbatchError::ShutdownRace(message)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::Content;

    fn stdio(command: &str) -> McpServerConfig {
        McpServerConfig {
            transport: McpTransport::Stdio {
                command: command.into(),
                args: vec![],
                env: HashMap::new(),
            },
            auto_connect: true,
            timeout_secs: 5,
        }
    }

    #[test]
    fn payload_keeps_text_content_items() {
        let result = CallToolResult::success(vec![Content::text("[\"http://a/1.png\"]")]);
        let payload = result_payload(&result).unwrap();
        assert_eq!(payload["content"][0]["type"], "text");
        assert_eq!(payload["content"][0]["text"], "[\"http://a/1.png\"]");
    }

    #[tokio::test]
    async fn missing_binary_fails_to_connect() {
        let manager = McpClientManager::new();
        let err = manager
            .connect("imagegen", &stdio("/nonexistent/pixbatch-no-such-server"))
            .await
            .unwrap_err();
        assert!(matches!(err, PixbatchError::Mcp(_)));
        assert!(manager.list_tools("imagegen").await.is_err());
    }

    #[tokio::test]
    async fn unknown_server_is_an_error() {
        let manager = McpClientManager::new();
        assert!(manager.list_tools("nope").await.is_err());
        assert!(manager.call_tool("nope", "generate_image", None).await.is_err());
    }

    #[tokio::test]
    async fn disconnect_without_connections_is_clean() {
        let manager = McpClientManager::new();
        assert!(manager.disconnect_all().await.is_ok());
    }
}
