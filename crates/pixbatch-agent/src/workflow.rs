use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, info, warn};

use pixbatch_core::config::WorkflowConfig;
use pixbatch_core::error::{PixbatchError, Result};
use pixbatch_core::event::EventBus;
use pixbatch_core::traits::{AgentRuntime, DecisionSource, EventStream, ImageRetriever, SessionStore};
use pixbatch_core::types::*;

use crate::extract::{collect_image_refs, has_tool_response};
use crate::responder::build_resume_message;
use crate::scanner::{confirmation_count, confirmation_hint, scan_all};

/// Position of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Started,
    AwaitingApproval,
    Completing,
    ResumedCompleting,
    NudgedCompleting,
    Done,
}

impl WorkflowState {
    /// Whether `next` directly follows `self`.
    pub fn can_advance_to(self, next: WorkflowState) -> bool {
        use WorkflowState::*;
        matches!(
            (self, next),
            (Started, AwaitingApproval)
                | (Started, Completing)
                | (AwaitingApproval, ResumedCompleting)
                | (ResumedCompleting, NudgedCompleting)
                | (ResumedCompleting, Done)
                | (Completing, Done)
                | (NudgedCompleting, Done)
        )
    }
}

/// Everything a controller needs from its surroundings.
pub struct WorkflowContext {
    pub config: WorkflowConfig,
    pub runtime: Arc<dyn AgentRuntime>,
    pub sessions: Arc<dyn SessionStore>,
    pub event_bus: Arc<EventBus>,
}

/// The decision taken for a paused run.
#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    pub info: ApprovalInfo,
    pub approved: bool,
    pub origin: DecisionOrigin,
}

/// Summary of one finished workflow run.
#[derive(Debug, Clone)]
pub struct WorkflowReport {
    pub session_id: SessionId,
    /// Every state visited, starting with `Started`.
    pub trace: Vec<WorkflowState>,
    pub approval: Option<ApprovalOutcome>,
    pub nudged: bool,
    pub events: Vec<TurnEvent>,
    pub references: Vec<String>,
    pub retrievals: Vec<RetrievalOutcome>,
}

impl WorkflowReport {
    pub fn final_state(&self) -> WorkflowState {
        self.trace.last().copied().unwrap_or(WorkflowState::Started)
    }

    pub fn saved(&self) -> usize {
        self.retrievals.iter().filter(|r| r.is_saved()).count()
    }
}

struct Machine {
    trace: Vec<WorkflowState>,
}

impl Machine {
    fn new() -> Self {
        Self {
            trace: vec![WorkflowState::Started],
        }
    }

    fn state(&self) -> WorkflowState {
        self.trace.last().copied().unwrap_or(WorkflowState::Started)
    }

    fn advance(&mut self, next: WorkflowState) -> Result<()> {
        let current = self.state();
        if !current.can_advance_to(next) {
            return Err(PixbatchError::Runtime(format!(
                "invalid workflow transition {:?} -> {:?}",
                current, next
            )));
        }
        debug!(from = ?current, to = ?next, "Workflow transition");
        self.trace.push(next);
        Ok(())
    }
}

/// Drives one request through run, optional approval and resume, optional
/// nudge, then extraction and retrieval of the generated images.
pub struct WorkflowController {
    ctx: WorkflowContext,
    decisions: Arc<dyn DecisionSource>,
    retriever: Arc<dyn ImageRetriever>,
}

impl WorkflowController {
    pub fn new(
        ctx: WorkflowContext,
        decisions: Arc<dyn DecisionSource>,
        retriever: Arc<dyn ImageRetriever>,
    ) -> Self {
        Self {
            ctx,
            decisions,
            retriever,
        }
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.ctx.event_bus
    }

    /// Run a request to completion.
    ///
    /// Errors starting or resuming a turn propagate; retrieval failures are
    /// reported per image in the returned report.
    pub async fn run(&self, request: &RunRequest) -> Result<WorkflowReport> {
        let sid = &request.session_id;
        let generation_tool = self.ctx.config.generation_tool.as_str();
        let mut machine = Machine::new();
        let mut log = Vec::new();

        self.ctx.sessions.create(sid).await?;
        self.ctx.event_bus.publish(WorkflowEvent::RunStarted {
            session_id: sid.clone(),
            query: request.query.clone(),
        });
        info!(session = %sid, auto_approve = request.auto_approve, "Workflow started");

        let stream = self
            .ctx
            .runtime
            .start_run(sid, Message::user_text(request.query.clone()))
            .await?;
        self.drain(stream, &mut log).await?;

        let pending = scan_all(&log);
        let mut approval = None;
        let mut nudged = false;

        match pending.first().cloned() {
            None => machine.advance(WorkflowState::Completing)?,
            Some(info) => {
                if pending.len() > 1 {
                    warn!(
                        ignored = pending.len() - 1,
                        "Several approval requests in one run, answering only the first"
                    );
                }
                machine.advance(WorkflowState::AwaitingApproval)?;

                let (approved, origin) = self.obtain_decision(request, &info, &log).await?;
                self.ctx
                    .event_bus
                    .publish(WorkflowEvent::ApprovalResolved { approved, origin });
                info!(approval_id = %info.approval_id, approved, ?origin, "Approval resolved");

                let resume_from = log.len();
                let stream = self
                    .ctx
                    .runtime
                    .resume_run(sid, build_resume_message(&info, approved), &info.invocation_id)
                    .await?;
                self.drain(stream, &mut log).await?;
                machine.advance(WorkflowState::ResumedCompleting)?;

                if approved && !has_tool_response(&log[resume_from..], generation_tool) {
                    info!("Approved but nothing generated yet, nudging the agent once");
                    machine.advance(WorkflowState::NudgedCompleting)?;
                    self.ctx.event_bus.publish(WorkflowEvent::Nudged);
                    let stream = self
                        .ctx
                        .runtime
                        .start_run(sid, Message::user_text(self.ctx.config.nudge_message.clone()))
                        .await?;
                    self.drain(stream, &mut log).await?;
                    nudged = true;
                }

                approval = Some(ApprovalOutcome {
                    info,
                    approved,
                    origin,
                });
            }
        }

        machine.advance(WorkflowState::Done)?;

        let references = collect_image_refs(&log, generation_tool);
        self.ctx.event_bus.publish(WorkflowEvent::ImagesFound {
            count: references.len(),
        });

        let retrievals = if references.is_empty() {
            info!("No images were generated");
            Vec::new()
        } else {
            info!(count = references.len(), "Retrieving generated images");
            self.retriever.retrieve(&references).await
        };

        for outcome in &retrievals {
            let event = match outcome {
                RetrievalOutcome::Saved {
                    index,
                    reference,
                    path,
                } => WorkflowEvent::ImageSaved {
                    index: *index,
                    reference: reference.clone(),
                    path: path.clone(),
                },
                RetrievalOutcome::Failed {
                    index,
                    reference,
                    error,
                } => WorkflowEvent::ImageFailed {
                    index: *index,
                    reference: reference.clone(),
                    error: error.clone(),
                },
            };
            self.ctx.event_bus.publish(event);
        }

        let report = WorkflowReport {
            session_id: sid.clone(),
            trace: machine.trace,
            approval,
            nudged,
            events: log,
            references,
            retrievals,
        };
        self.ctx.event_bus.publish(WorkflowEvent::RunComplete {
            session_id: sid.clone(),
            images: report.saved(),
        });
        info!(session = %sid, saved = report.saved(), "Workflow complete");

        Ok(report)
    }

    /// Consume a turn's events in order, reporting each one.
    async fn drain(&self, mut stream: EventStream<'_>, log: &mut Vec<TurnEvent>) -> Result<()> {
        while let Some(event) = stream.next().await {
            let event = event?;
            self.report_event(&event);
            log.push(event);
        }
        Ok(())
    }

    fn report_event(&self, event: &TurnEvent) {
        if event.is_user() {
            return;
        }
        for part in &event.parts {
            let published = match part {
                Part::Text { text } if !text.is_empty() => WorkflowEvent::AgentText(text.clone()),
                Part::Text { .. } => continue,
                Part::ToolCall(call) if call.name == CONFIRMATION_TOOL => continue,
                Part::ToolCall(call) => WorkflowEvent::ToolCalled {
                    name: call.name.clone(),
                    args: call.args.clone(),
                },
                Part::ToolResponse(resp) => WorkflowEvent::ToolResponded {
                    name: resp.name.clone(),
                    response: resp.response.clone(),
                },
            };
            self.ctx.event_bus.publish(published);
        }
    }

    async fn obtain_decision(
        &self,
        request: &RunRequest,
        info: &ApprovalInfo,
        log: &[TurnEvent],
    ) -> Result<(bool, DecisionOrigin)> {
        let hint = confirmation_hint(log, &info.approval_id);
        self.ctx.event_bus.publish(WorkflowEvent::ApprovalRequested {
            approval_id: info.approval_id.clone(),
            hint: hint.clone(),
        });

        if request.auto_approve {
            return Ok((true, DecisionOrigin::Auto));
        }

        let prompt = ApprovalPrompt {
            approval_id: info.approval_id.clone(),
            hint,
            requested_count: confirmation_count(log, &info.approval_id),
            threshold: self.ctx.config.large_bulk,
        };

        let timeout_secs = self.ctx.config.approval_timeout_secs;
        if timeout_secs == 0 {
            let approved = self.decisions.decide(&prompt).await?;
            return Ok((approved, DecisionOrigin::Human));
        }

        match tokio::time::timeout(Duration::from_secs(timeout_secs), self.decisions.decide(&prompt)).await {
            Ok(decided) => Ok((decided?, DecisionOrigin::Human)),
            Err(_) => {
                warn!(timeout_secs, "No decision in time, rejecting the bulk");
                Ok((false, DecisionOrigin::Timeout))
            }
        }
    }
}
