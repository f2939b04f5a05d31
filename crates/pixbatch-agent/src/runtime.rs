use std::sync::Arc;

use async_stream::try_stream;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use pixbatch_core::config::AgentConfig;
use pixbatch_core::error::{PixbatchError, Result};
use pixbatch_core::traits::{AgentRuntime, EventStream, Planner, SessionStore};
use pixbatch_core::types::*;

use crate::registry::ToolRegistry;

/// How an invocation proceeds after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Finished,
    Paused,
}

/// Events produced by one planner turn and what happens next.
struct Step {
    events: Vec<TurnEvent>,
    flow: Flow,
}

/// In-process agent runtime with pausable tool calls.
///
/// Each invocation alternates planner turns and tool execution. A tool that
/// records a confirmation request ends the invocation with a
/// `adk_request_confirmation` call; `resume_run` re-executes that tool with the
/// human decision attached and continues under the same invocation id.
pub struct LocalRuntime {
    config: AgentConfig,
    planner: Arc<dyn Planner>,
    tools: Arc<ToolRegistry>,
    sessions: Arc<dyn SessionStore>,
    cancel: CancellationToken,
}

impl LocalRuntime {
    pub fn new(
        config: AgentConfig,
        planner: Arc<dyn Planner>,
        tools: Arc<ToolRegistry>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            config,
            planner,
            tools,
            sessions,
            cancel: CancellationToken::new(),
        }
    }

    /// Get a cancellation token for this runtime.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    async fn record(&self, sid: &SessionId, event: &TurnEvent) -> Result<()> {
        self.sessions
            .append_events(sid, std::slice::from_ref(event))
            .await
    }

    /// Execute one tool call, returning its response event and any pause request.
    async fn execute_call(
        &self,
        call: &ToolCall,
        ctx: ToolContext,
    ) -> (TurnEvent, Option<ConfirmationRequest>) {
        debug!(tool = %call.name, call_id = %call.id, "Executing tool call");

        let result = match self
            .tools
            .execute(&call.name, call.args.clone(), ctx.clone())
            .await
        {
            Ok(r) => r,
            Err(e) => {
                error!(tool = %call.name, error = %e, "Tool execution failed");
                ToolResult::error(e.to_string())
            }
        };

        let event = TurnEvent::new(
            ctx.invocation_id.clone(),
            self.config.name.clone(),
            vec![Part::ToolResponse(ToolResponse {
                id: call.id.clone(),
                name: call.name.clone(),
                response: result.response,
            })],
        );
        (event, ctx.take_confirmation_request())
    }

    /// Emit the confirmation call for a paused tool and persist the pause.
    async fn pause(
        &self,
        sid: &SessionId,
        invocation_id: &str,
        original: &ToolCall,
        request: ConfirmationRequest,
    ) -> Result<TurnEvent> {
        let call = ToolCall {
            id: format!("adk-{}", Uuid::new_v4()),
            name: CONFIRMATION_TOOL.to_string(),
            args: serde_json::json!({
                "originalFunctionCall": original,
                "toolConfirmation": {
                    "hint": request.hint,
                    "confirmed": false,
                    "payload": request.payload,
                },
            }),
        };

        self.sessions
            .save_paused(
                sid,
                PausedCall {
                    invocation_id: invocation_id.to_string(),
                    confirmation_call_id: call.id.clone(),
                    original: original.clone(),
                    request,
                },
            )
            .await?;

        info!(
            session = %sid,
            invocation = %invocation_id,
            tool = %original.name,
            "Tool call paused for confirmation"
        );

        let event = TurnEvent::new(invocation_id, self.config.name.clone(), vec![Part::ToolCall(call)]);
        self.record(sid, &event).await?;
        Ok(event)
    }

    /// One planner turn followed by execution of the requested tool calls.
    async fn run_turn(&self, sid: &SessionId, invocation_id: &str) -> Result<Step> {
        if self.cancel.is_cancelled() {
            return Err(PixbatchError::Cancelled);
        }

        let history = self.sessions.load_events(sid).await?;
        let tool_defs = self.tools.definitions();

        let reply = tokio::select! {
            result = self.planner.next_turn(&history, &tool_defs) => result?,
            _ = self.cancel.cancelled() => return Err(PixbatchError::Cancelled),
        };

        let calls: Vec<ToolCall> = reply.tool_calls().into_iter().cloned().collect();
        let model_event = TurnEvent::new(invocation_id, self.config.name.clone(), reply.parts);
        self.record(sid, &model_event).await?;

        let mut events = vec![model_event];
        if calls.is_empty() {
            return Ok(Step {
                events,
                flow: Flow::Finished,
            });
        }

        for (i, call) in calls.iter().enumerate() {
            let ctx = ToolContext::new(sid.clone(), invocation_id, call.id.clone());
            let (response, pause) = self.execute_call(call, ctx).await;
            self.record(sid, &response).await?;
            events.push(response);

            if let Some(request) = pause {
                let skipped = calls.len() - i - 1;
                if skipped > 0 {
                    debug!(skipped, "Dropping tool calls queued behind a paused call");
                }
                events.push(self.pause(sid, invocation_id, call, request).await?);
                return Ok(Step {
                    events,
                    flow: Flow::Paused,
                });
            }
        }

        Ok(Step {
            events,
            flow: Flow::Continue,
        })
    }

    /// Yield `opening`, then keep running turns while the invocation continues.
    fn drive<'a>(
        &'a self,
        sid: &'a SessionId,
        invocation_id: String,
        opening: Vec<TurnEvent>,
        mut flow: Flow,
    ) -> EventStream<'a> {
        let max_turns = self.config.max_turns;
        Box::pin(try_stream! {
            for event in opening {
                yield event;
            }

            let mut turns = 0usize;
            while flow == Flow::Continue {
                if turns >= max_turns {
                    Err::<(), PixbatchError>(PixbatchError::MaxTurnsExceeded(max_turns))?;
                }
                turns += 1;

                let step = self.run_turn(sid, &invocation_id).await?;
                for event in step.events {
                    yield event;
                }
                flow = step.flow;
            }

            debug!(invocation = %invocation_id, turns, ?flow, "Invocation yielded control");
        })
    }
}

impl AgentRuntime for LocalRuntime {
    fn start_run<'a>(
        &'a self,
        session_id: &'a SessionId,
        message: Message,
    ) -> BoxFuture<'a, Result<EventStream<'a>>> {
        Box::pin(async move {
            let invocation_id = format!("e-{}", Uuid::new_v4());
            let opening = TurnEvent::new(invocation_id.clone(), "user", message.parts);
            self.record(session_id, &opening).await?;

            info!(session = %session_id, invocation = %invocation_id, "Invocation started");
            Ok(self.drive(session_id, invocation_id, vec![opening], Flow::Continue))
        })
    }

    fn resume_run<'a>(
        &'a self,
        session_id: &'a SessionId,
        message: Message,
        invocation_id: &'a str,
    ) -> BoxFuture<'a, Result<EventStream<'a>>> {
        Box::pin(async move {
            let answer = message
                .tool_responses()
                .into_iter()
                .find(|r| r.name == CONFIRMATION_TOOL)
                .cloned()
                .ok_or_else(|| {
                    PixbatchError::Runtime("resume message carries no confirmation response".into())
                })?;

            let paused = self
                .sessions
                .take_paused(session_id, invocation_id, &answer.id)
                .await?
                .ok_or_else(|| PixbatchError::UnknownResume {
                    invocation_id: invocation_id.to_string(),
                    call_id: answer.id.clone(),
                })?;

            let confirmed = answer
                .response
                .get("confirmed")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);

            info!(
                session = %session_id,
                invocation = %invocation_id,
                confirmed,
                "Resuming paused invocation"
            );

            let opening = TurnEvent::new(invocation_id, "user", message.parts);
            self.record(session_id, &opening).await?;

            let ctx = ToolContext::new(session_id.clone(), invocation_id, paused.original.id.clone())
                .with_confirmation(ConfirmationState {
                    confirmed,
                    payload: paused.request.payload.clone(),
                });
            let (response, pause) = self.execute_call(&paused.original, ctx).await;
            self.record(session_id, &response).await?;

            let mut events = vec![opening, response];
            let flow = match pause {
                Some(request) => {
                    events.push(
                        self.pause(session_id, invocation_id, &paused.original, request)
                            .await?,
                    );
                    Flow::Paused
                }
                None => Flow::Continue,
            };

            Ok(self.drive(session_id, invocation_id.to_string(), events, flow))
        })
    }
}
