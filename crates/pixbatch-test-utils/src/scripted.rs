use std::collections::VecDeque;
use std::sync::Mutex;

use futures::future::BoxFuture;
use futures::stream;

use pixbatch_core::error::{PixbatchError, Result};
use pixbatch_core::traits::{AgentRuntime, EventStream, Planner};
use pixbatch_core::types::*;

/// A recorded `resume_run` call.
#[derive(Debug, Clone)]
pub struct ResumeCall {
    pub invocation_id: String,
    pub message: Message,
}

/// Agent runtime that replays queued event batches.
///
/// Each `start_run` pops the next start batch and each `resume_run` pops the
/// next resume batch. An exhausted queue yields an empty stream.
#[derive(Default)]
pub struct ScriptedRuntime {
    starts: Mutex<VecDeque<Vec<TurnEvent>>>,
    resumes: Mutex<VecDeque<Vec<TurnEvent>>>,
    start_error: Mutex<Option<PixbatchError>>,
    seen_starts: Mutex<Vec<Message>>,
    seen_resumes: Mutex<Vec<ResumeCall>>,
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the events for the next `start_run`.
    pub fn start(self, events: Vec<TurnEvent>) -> Self {
        self.starts.lock().unwrap().push_back(events);
        self
    }

    /// Queue the events for the next `resume_run`.
    pub fn resume(self, events: Vec<TurnEvent>) -> Self {
        self.resumes.lock().unwrap().push_back(events);
        self
    }

    /// Make the next `start_run` fail with `error`.
    pub fn fail_start(self, error: PixbatchError) -> Self {
        *self.start_error.lock().unwrap() = Some(error);
        self
    }

    /// Messages passed to `start_run`, in call order.
    pub fn starts(&self) -> Vec<Message> {
        self.seen_starts.lock().unwrap().clone()
    }

    /// Calls made to `resume_run`, in call order.
    pub fn resumes(&self) -> Vec<ResumeCall> {
        self.seen_resumes.lock().unwrap().clone()
    }
}

fn replay<'a>(events: Vec<TurnEvent>) -> EventStream<'a> {
    Box::pin(stream::iter(events.into_iter().map(Ok)))
}

impl AgentRuntime for ScriptedRuntime {
    fn start_run<'a>(
        &'a self,
        _session_id: &'a SessionId,
        message: Message,
    ) -> BoxFuture<'a, Result<EventStream<'a>>> {
        Box::pin(async move {
            self.seen_starts.lock().unwrap().push(message);
            if let Some(error) = self.start_error.lock().unwrap().take() {
                return Err(error);
            }
            let events = self.starts.lock().unwrap().pop_front().unwrap_or_default();
            Ok(replay(events))
        })
    }

    fn resume_run<'a>(
        &'a self,
        _session_id: &'a SessionId,
        message: Message,
        invocation_id: &'a str,
    ) -> BoxFuture<'a, Result<EventStream<'a>>> {
        Box::pin(async move {
            self.seen_resumes.lock().unwrap().push(ResumeCall {
                invocation_id: invocation_id.to_string(),
                message,
            });
            let events = self.resumes.lock().unwrap().pop_front().unwrap_or_default();
            Ok(replay(events))
        })
    }
}

/// Planner that returns queued replies in order, then an empty text reply.
pub struct ScriptedPlanner {
    replies: Mutex<VecDeque<Message>>,
}

impl ScriptedPlanner {
    pub fn new(replies: Vec<Message>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
        }
    }
}

impl Planner for ScriptedPlanner {
    fn next_turn<'a>(
        &'a self,
        _history: &'a [TurnEvent],
        _tools: &'a [ToolDefinition],
    ) -> BoxFuture<'a, Result<Message>> {
        Box::pin(async move {
            let next = self.replies.lock().unwrap().pop_front();
            Ok(next.unwrap_or_else(|| Message::model(vec![Part::text("")])))
        })
    }
}
