use thiserror::Error;

#[derive(Debug, Error)]
pub enum PixbatchError {
    // Runtime errors
    #[error("Agent runtime error: {0}")]
    Runtime(String),

    /// Benign transport teardown race while a tool process shuts down.
    #[error("Shutdown race: {0}")]
    ShutdownRace(String),

    #[error("Agent exceeded max turns ({0})")]
    MaxTurnsExceeded(usize),

    #[error("Agent cancelled")]
    Cancelled,

    #[error("No paused call for invocation {invocation_id} with confirmation id {call_id}")]
    UnknownResume {
        invocation_id: String,
        call_id: String,
    },

    // Session errors
    #[error("Session already exists: {0}")]
    SessionExists(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    // Tool errors
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("Tool input validation failed: {0}")]
    ToolValidation(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // MCP errors
    #[error("MCP error: {0}")]
    Mcp(String),

    // Retrieval errors
    #[error("Retrieval failed for {reference}: {message}")]
    Retrieval { reference: String, message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PixbatchError {
    /// True for errors the process boundary may drop silently.
    pub fn is_shutdown_race(&self) -> bool {
        matches!(self, Self::ShutdownRace(_))
    }
}

pub type Result<T> = std::result::Result<T, PixbatchError>;
