use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved tool name the runtime uses to signal a pause for human approval.
pub const CONFIRMATION_TOOL: &str = "adk_request_confirmation";

/// Unique session identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a fresh `bulk_xxxxxxxx` identifier.
    pub fn new() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(format!("bulk_{}", &hex[..8]))
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Author role of a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id: format!("call-{}", Uuid::new_v4()),
            name: name.into(),
            args,
        }
    }
}

/// The result of a tool invocation, matched to its call by `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResponse {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub response: serde_json::Value,
}

/// A single unit of content inside a message or turn event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    ToolCall(ToolCall),
    ToolResponse(ToolResponse),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// A message submitted to or produced by the agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::text(text)],
        }
    }

    pub fn model(parts: Vec<Part>) -> Self {
        Self {
            role: Role::Model,
            parts,
        }
    }

    /// Extract all text content from this message.
    pub fn text(&self) -> String {
        collect_text(&self.parts)
    }

    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        collect_calls(&self.parts)
    }

    pub fn tool_responses(&self) -> Vec<&ToolResponse> {
        collect_responses(&self.parts)
    }
}

/// One unit of the ordered event sequence emitted while a run executes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnEvent {
    pub id: String,
    pub invocation_id: String,
    /// `"user"` for submitted messages, the agent name otherwise.
    pub author: String,
    pub parts: Vec<Part>,
    pub timestamp: DateTime<Utc>,
}

impl TurnEvent {
    pub fn new(invocation_id: impl Into<String>, author: impl Into<String>, parts: Vec<Part>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            invocation_id: invocation_id.into(),
            author: author.into(),
            parts,
            timestamp: Utc::now(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.author == "user"
    }

    pub fn text(&self) -> String {
        collect_text(&self.parts)
    }

    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        collect_calls(&self.parts)
    }

    pub fn tool_responses(&self) -> Vec<&ToolResponse> {
        collect_responses(&self.parts)
    }
}

fn collect_text(parts: &[Part]) -> String {
    parts
        .iter()
        .filter_map(|p| match p {
            Part::Text { text } => Some(text.as_str()),
            Part::ToolCall(_) | Part::ToolResponse(_) => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

fn collect_calls(parts: &[Part]) -> Vec<&ToolCall> {
    parts
        .iter()
        .filter_map(|p| match p {
            Part::ToolCall(call) => Some(call),
            Part::Text { .. } | Part::ToolResponse(_) => None,
        })
        .collect()
}

fn collect_responses(parts: &[Part]) -> Vec<&ToolResponse> {
    parts
        .iter()
        .filter_map(|p| match p {
            Part::ToolResponse(resp) => Some(resp),
            Part::Text { .. } | Part::ToolCall(_) => None,
        })
        .collect()
}

/// Human decision attached to a resumed tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfirmationState {
    pub confirmed: bool,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// A pause request recorded by a tool on its invocation context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfirmationRequest {
    pub hint: String,
    pub payload: serde_json::Value,
}

/// Identifiers needed to answer a pending approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalInfo {
    pub approval_id: String,
    pub invocation_id: String,
}

/// A tool call suspended until its confirmation arrives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PausedCall {
    pub invocation_id: String,
    pub confirmation_call_id: String,
    pub original: ToolCall,
    pub request: ConfirmationRequest,
}

/// Result of a tool execution.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub response: serde_json::Value,
}

impl ToolResult {
    pub fn success(response: serde_json::Value) -> Self {
        Self { response }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            response: serde_json::json!({ "error": message.into() }),
        }
    }
}

/// Tool definition handed to the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Context passed to tools during execution.
#[derive(Clone)]
pub struct ToolContext {
    pub session_id: SessionId,
    pub invocation_id: String,
    pub call_id: String,
    /// Present only when the call is being resumed after a human decision.
    pub confirmation: Option<ConfirmationState>,
    requested: Arc<Mutex<Option<ConfirmationRequest>>>,
}

impl ToolContext {
    pub fn new(session_id: SessionId, invocation_id: impl Into<String>, call_id: impl Into<String>) -> Self {
        Self {
            session_id,
            invocation_id: invocation_id.into(),
            call_id: call_id.into(),
            confirmation: None,
            requested: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_confirmation(mut self, confirmation: ConfirmationState) -> Self {
        self.confirmation = Some(confirmation);
        self
    }

    /// Ask the runtime to pause this call until a human confirms it.
    pub fn request_confirmation(&self, hint: impl Into<String>, payload: serde_json::Value) {
        let mut slot = self.requested.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(ConfirmationRequest {
            hint: hint.into(),
            payload,
        });
    }

    /// Take the pause request recorded during execution, if any.
    pub fn take_confirmation_request(&self) -> Option<ConfirmationRequest> {
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("session_id", &self.session_id)
            .field("invocation_id", &self.invocation_id)
            .field("call_id", &self.call_id)
            .field("confirmation", &self.confirmation)
            .finish()
    }
}

/// A single workflow invocation requested by the user.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub query: String,
    pub session_id: SessionId,
    pub auto_approve: bool,
}

impl RunRequest {
    pub fn new(query: impl Into<String>, auto_approve: bool) -> Self {
        Self {
            query: query.into(),
            session_id: SessionId::new(),
            auto_approve,
        }
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = session_id;
        self
    }
}

/// What the human is asked to approve.
#[derive(Debug, Clone)]
pub struct ApprovalPrompt {
    pub approval_id: String,
    pub hint: Option<String>,
    pub requested_count: Option<u64>,
    pub threshold: u32,
}

/// Outcome of retrieving one image reference.
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalOutcome {
    Saved {
        index: usize,
        reference: String,
        path: std::path::PathBuf,
    },
    Failed {
        index: usize,
        reference: String,
        error: String,
    },
}

impl RetrievalOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}

/// Where a human decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionOrigin {
    Auto,
    Human,
    Timeout,
}

/// Workflow progress broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// Workflow run started.
    RunStarted { session_id: SessionId, query: String },
    /// Text produced by the agent.
    AgentText(String),
    /// The agent invoked a tool.
    ToolCalled { name: String, args: serde_json::Value },
    /// A tool returned.
    ToolResponded { name: String, response: serde_json::Value },
    /// The run paused for approval.
    ApprovalRequested { approval_id: String, hint: Option<String> },
    /// A decision was supplied for the paused call.
    ApprovalResolved { approved: bool, origin: DecisionOrigin },
    /// The agent acknowledged approval without acting and was nudged once.
    Nudged,
    /// Image references were extracted from the event log.
    ImagesFound { count: usize },
    /// An image was saved.
    ImageSaved { index: usize, reference: String, path: std::path::PathBuf },
    /// An image could not be retrieved.
    ImageFailed { index: usize, reference: String, error: String },
    /// Workflow run completed.
    RunComplete { session_id: SessionId, images: usize },
}
