use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::types::*;

/// Ordered events produced by one runtime turn.
pub type EventStream<'a> = BoxStream<'a, Result<TurnEvent>>;

/// Agent runtime: runs turns and supports pausing a tool call for approval.
pub trait AgentRuntime: Send + Sync + 'static {
    /// Submit a fresh message as a new invocation in an existing session.
    fn start_run<'a>(
        &'a self,
        session_id: &'a SessionId,
        message: Message,
    ) -> BoxFuture<'a, Result<EventStream<'a>>>;

    /// Answer a paused invocation, continuing under the same invocation id.
    fn resume_run<'a>(
        &'a self,
        session_id: &'a SessionId,
        message: Message,
        invocation_id: &'a str,
    ) -> BoxFuture<'a, Result<EventStream<'a>>>;
}

/// Model capability: produce the next turn given history and available tools.
pub trait Planner: Send + Sync + 'static {
    fn next_turn<'a>(
        &'a self,
        history: &'a [TurnEvent],
        tools: &'a [ToolDefinition],
    ) -> BoxFuture<'a, Result<Message>>;
}

/// Tool: extensible tool execution.
pub trait Tool: Send + Sync + 'static {
    /// Tool name (used in tool calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema for tool input.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with given input and context.
    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>>;

    /// Timeout in seconds for this tool.
    fn timeout_secs(&self) -> u64 {
        30
    }
}

/// Session store: per-session event log and paused calls.
pub trait SessionStore: Send + Sync + 'static {
    /// Create a session. Fails if the id is already taken.
    fn create(&self, sid: &SessionId) -> BoxFuture<'_, Result<()>>;

    /// Append events to a session.
    fn append_events(&self, sid: &SessionId, events: &[TurnEvent]) -> BoxFuture<'_, Result<()>>;

    /// Load the full event history of a session.
    fn load_events(&self, sid: &SessionId) -> BoxFuture<'_, Result<Vec<TurnEvent>>>;

    /// Persist a paused call so it can be resumed later.
    fn save_paused(&self, sid: &SessionId, call: PausedCall) -> BoxFuture<'_, Result<()>>;

    /// Remove and return the paused call matching both ids.
    fn take_paused(
        &self,
        sid: &SessionId,
        invocation_id: &str,
        confirmation_call_id: &str,
    ) -> BoxFuture<'_, Result<Option<PausedCall>>>;
}

/// Source of the human decision for a paused call.
pub trait DecisionSource: Send + Sync + 'static {
    fn decide<'a>(&'a self, prompt: &'a ApprovalPrompt) -> BoxFuture<'a, Result<bool>>;
}

/// Downstream retrieval of generated image references.
pub trait ImageRetriever: Send + Sync + 'static {
    /// Fetch every reference independently; failures are reported per item.
    fn retrieve<'a>(&'a self, references: &'a [String]) -> BoxFuture<'a, Vec<RetrievalOutcome>>;
}
