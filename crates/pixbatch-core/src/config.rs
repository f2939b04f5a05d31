use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PixbatchError, Result};

/// Top-level pixbatch configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub mcp: Option<McpConfig>,
}

/// Approval workflow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Requests above this many images need approval.
    #[serde(default = "default_large_bulk")]
    pub large_bulk: u32,
    /// Requests above this many images are refused outright.
    #[serde(default = "default_max_bulk_size")]
    pub max_bulk_size: u32,
    #[serde(default)]
    pub auto_approve: bool,
    /// Seconds to wait for a human decision (0 = wait forever).
    #[serde(default)]
    pub approval_timeout_secs: u64,
    /// Tool whose responses carry generated image references.
    #[serde(default = "default_generation_tool")]
    pub generation_tool: String,
    #[serde(default = "default_nudge_message")]
    pub nudge_message: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            large_bulk: default_large_bulk(),
            max_bulk_size: default_max_bulk_size(),
            auto_approve: false,
            approval_timeout_secs: 0,
            generation_tool: default_generation_tool(),
            nudge_message: default_nudge_message(),
        }
    }
}

fn default_large_bulk() -> u32 { 4 }
fn default_max_bulk_size() -> u32 { 100 }
fn default_generation_tool() -> String { "generate_image".to_string() }
fn default_nudge_message() -> String {
    "Please proceed with generating the images now.".to_string()
}

/// Bundled agent runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Upper bound on images per generation call.
    #[serde(default = "default_max_images_per_call")]
    pub max_images_per_call: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            max_turns: default_max_turns(),
            max_images_per_call: default_max_images_per_call(),
        }
    }
}

fn default_agent_name() -> String { "image_agent".to_string() }
fn default_max_turns() -> usize { 8 }
fn default_max_images_per_call() -> u32 { 4 }

/// Where and how generated images are saved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default = "default_retrieval_timeout")]
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            file_prefix: default_file_prefix(),
            extension: default_extension(),
            timeout_secs: default_retrieval_timeout(),
        }
    }
}

impl RetrievalConfig {
    /// Resolve the output directory (expand ~).
    pub fn output_path(&self) -> PathBuf {
        expand_home(&self.output_dir)
    }
}

fn default_output_dir() -> String { ".".to_string() }
fn default_file_prefix() -> String { "generated_image_".to_string() }
fn default_extension() -> String { "png".to_string() }
fn default_retrieval_timeout() -> u64 { 60 }

/// MCP (Model Context Protocol) configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: HashMap<String, McpServerConfig>,
}

/// Configuration for a single MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    #[serde(flatten)]
    pub transport: McpTransport,
    #[serde(default = "default_auto_connect")]
    pub auto_connect: bool,
    /// Per-tool-call timeout in seconds.
    #[serde(default = "default_mcp_timeout")]
    pub timeout_secs: u64,
}

fn default_auto_connect() -> bool { true }
fn default_mcp_timeout() -> u64 { 30 }

/// MCP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpTransport {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    Http {
        url: String,
    },
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| PixbatchError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| PixbatchError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the workflow cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.workflow.large_bulk == 0 {
            return Err(PixbatchError::Config(
                "workflow.large_bulk must be at least 1".into(),
            ));
        }
        if self.workflow.max_bulk_size < self.workflow.large_bulk {
            return Err(PixbatchError::Config(format!(
                "workflow.max_bulk_size ({}) is below workflow.large_bulk ({})",
                self.workflow.max_bulk_size, self.workflow.large_bulk
            )));
        }
        if self.agent.max_images_per_call == 0 {
            return Err(PixbatchError::Config(
                "agent.max_images_per_call must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var("HOME").ok().map(PathBuf::from) {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_PIXBATCH_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_PIXBATCH_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_PIXBATCH_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_PIXBATCH_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_PIXBATCH_VAR}\"");
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.workflow.large_bulk, 4);
        assert_eq!(config.workflow.max_bulk_size, 100);
        assert!(!config.workflow.auto_approve);
        assert_eq!(config.workflow.approval_timeout_secs, 0);
        assert_eq!(config.workflow.generation_tool, "generate_image");
        assert_eq!(config.agent.max_images_per_call, 4);
        assert_eq!(config.retrieval.file_prefix, "generated_image_");
        assert!(config.mcp.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stdio_server_parses() {
        let toml_str = r#"
[mcp.servers.image_gen]
type = "stdio"
command = "npx"
args = ["-y", "@gongrzhe/image-gen-server"]
env = { MODEL = "flux" }
timeout_secs = 45
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        let servers = config.mcp.unwrap().servers;
        let server = &servers["image_gen"];
        assert_eq!(server.timeout_secs, 45);
        assert!(server.auto_connect);
        match &server.transport {
            McpTransport::Stdio { command, args, env } => {
                assert_eq!(command, "npx");
                assert_eq!(args.len(), 2);
                assert_eq!(env["MODEL"], "flux");
            }
            other => panic!("expected stdio transport, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_inverted_limits() {
        let mut config = AppConfig::default();
        config.workflow.large_bulk = 10;
        config.workflow.max_bulk_size = 5;
        assert!(matches!(config.validate(), Err(PixbatchError::Config(_))));

        let mut config = AppConfig::default();
        config.agent.max_images_per_call = 0;
        assert!(config.validate().is_err());
    }
}
