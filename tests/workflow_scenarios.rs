//! End-to-end workflow runs over the bundled runtime and planner.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;

use pixbatch_agent::{
    AnswerDecision, BatchPlanner, BulkGenerateTool, FixedDecision, InMemorySessionStore,
    LocalRuntime, ToolRegistry, WorkflowContext, WorkflowController, WorkflowState, BULK_TOOL,
};
use pixbatch_core::config::{AgentConfig, WorkflowConfig};
use pixbatch_core::error::Result;
use pixbatch_core::event::EventBus;
use pixbatch_core::traits::{DecisionSource, Planner, Tool};
use pixbatch_core::types::*;
use pixbatch_test_utils::{generation_payload, FakeImageTool, NeverDecision, RecordingRetriever};

/// Acknowledges approval with text once before letting the batch planner act.
struct StallOnceAfterApproval {
    inner: BatchPlanner,
    stalled: AtomicBool,
}

impl Planner for StallOnceAfterApproval {
    fn next_turn<'a>(
        &'a self,
        history: &'a [TurnEvent],
        tools: &'a [ToolDefinition],
    ) -> BoxFuture<'a, Result<Message>> {
        Box::pin(async move {
            let just_approved = history
                .last()
                .map(|e| {
                    e.tool_responses()
                        .iter()
                        .any(|r| r.name == BULK_TOOL && r.response["status"] == "approved")
                })
                .unwrap_or(false);
            if just_approved && !self.stalled.swap(true, Ordering::SeqCst) {
                return Ok(Message::model(vec![Part::text(
                    "Approved! I'll start generating the images.",
                )]));
            }
            self.inner.next_turn(history, tools).await
        })
    }
}

/// Generation tool answering every call with the same payload.
struct FixedPayloadTool(serde_json::Value);

impl Tool for FixedPayloadTool {
    fn name(&self) -> &str {
        "generate_image"
    }

    fn description(&self) -> &str {
        "Generate images."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    fn execute(
        &self,
        _input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        let payload = self.0.clone();
        Box::pin(async move { Ok(ToolResult::success(payload)) })
    }
}

struct Setup {
    controller: WorkflowController,
    retriever: Arc<RecordingRetriever>,
}

fn batch_planner() -> BatchPlanner {
    BatchPlanner::new(&AgentConfig::default(), "generate_image").unwrap()
}

fn setup(
    planner: Arc<dyn Planner>,
    generator: Arc<dyn Tool>,
    decisions: Arc<dyn DecisionSource>,
) -> Setup {
    let config = WorkflowConfig::default();
    let mut tools = ToolRegistry::new();
    tools.register(BulkGenerateTool::from_config(&config));
    tools.register_arc(generator);

    let sessions = Arc::new(InMemorySessionStore::new());
    let runtime = Arc::new(LocalRuntime::new(
        AgentConfig::default(),
        planner,
        Arc::new(tools),
        sessions.clone(),
    ));
    let retriever = Arc::new(RecordingRetriever::new());

    let controller = WorkflowController::new(
        WorkflowContext {
            config,
            runtime,
            sessions,
            event_bus: Arc::new(EventBus::default()),
        },
        decisions,
        retriever.clone(),
    );
    Setup {
        controller,
        retriever,
    }
}

fn tool_calls<'a>(events: &'a [TurnEvent], name: &str) -> Vec<&'a ToolCall> {
    events
        .iter()
        .flat_map(|e| e.tool_calls())
        .filter(|c| c.name == name)
        .collect()
}

#[tokio::test]
async fn scenario_a_small_bulk_runs_without_approval() {
    let images = Arc::new(FakeImageTool::new("generate_image"));
    let s = setup(Arc::new(batch_planner()), images.clone(), Arc::new(NeverDecision));

    let report = s
        .controller
        .run(&RunRequest::new("Generate 3 images of a lighthouse at dusk", false))
        .await
        .unwrap();

    assert_eq!(
        report.trace,
        vec![WorkflowState::Started, WorkflowState::Completing, WorkflowState::Done]
    );
    assert!(report.approval.is_none());
    assert_eq!(images.calls(), vec![3]);
    assert_eq!(report.references.len(), 3);
    assert_eq!(s.retriever.seen(), report.references);
    assert_eq!(report.saved(), 3);
}

#[tokio::test]
async fn scenario_b_auto_approved_bulk_generates_in_batches() {
    let images = Arc::new(FakeImageTool::new("generate_image"));
    let s = setup(Arc::new(batch_planner()), images.clone(), Arc::new(NeverDecision));

    let report = s
        .controller
        .run(&RunRequest::new("Generate 6 images of a red fox", true))
        .await
        .unwrap();

    let approval = report.approval.as_ref().expect("paused once");
    assert!(approval.approved);
    assert_eq!(approval.origin, DecisionOrigin::Auto);
    assert!(!report.nudged);
    assert_eq!(images.calls(), vec![4, 2]);
    assert_eq!(report.references.len(), 6);
    assert_eq!(report.final_state(), WorkflowState::Done);

    // The resumed turn continues the paused invocation.
    let resumed: Vec<&TurnEvent> = report
        .events
        .iter()
        .filter(|e| !tool_calls(std::slice::from_ref(*e), "generate_image").is_empty())
        .collect();
    assert!(resumed
        .iter()
        .all(|e| e.invocation_id == approval.info.invocation_id));
}

#[tokio::test]
async fn scenario_b_stalled_agent_is_nudged_exactly_once() {
    let images = Arc::new(FakeImageTool::new("generate_image"));
    let planner = Arc::new(StallOnceAfterApproval {
        inner: batch_planner(),
        stalled: AtomicBool::new(false),
    });
    let s = setup(planner, images.clone(), Arc::new(FixedDecision(true)));

    let report = s
        .controller
        .run(&RunRequest::new("Generate 6 images of a red fox", false))
        .await
        .unwrap();

    assert!(report.nudged);
    assert_eq!(
        report.trace,
        vec![
            WorkflowState::Started,
            WorkflowState::AwaitingApproval,
            WorkflowState::ResumedCompleting,
            WorkflowState::NudgedCompleting,
            WorkflowState::Done
        ]
    );
    let nudges = report
        .events
        .iter()
        .filter(|e| e.is_user() && e.text() == "Please proceed with generating the images now.")
        .count();
    assert_eq!(nudges, 1);
    assert_eq!(images.calls(), vec![4, 2]);
    assert_eq!(report.references.len(), 6);
}

#[tokio::test]
async fn scenario_c_rejected_bulk_generates_nothing() {
    let images = Arc::new(FakeImageTool::new("generate_image"));
    let s = setup(
        Arc::new(batch_planner()),
        images.clone(),
        Arc::new(AnswerDecision::new("no")),
    );

    let report = s
        .controller
        .run(&RunRequest::new("Generate 6 images of a red fox", false))
        .await
        .unwrap();

    let approval = report.approval.as_ref().expect("paused once");
    assert!(!approval.approved);
    assert_eq!(approval.origin, DecisionOrigin::Human);
    assert!(!report.nudged);
    assert!(images.calls().is_empty());
    assert!(tool_calls(&report.events, "generate_image").is_empty());
    assert!(report.references.is_empty());
    assert!(s.retriever.seen().is_empty());

    let resume = report
        .events
        .iter()
        .flat_map(|e| e.tool_responses())
        .find(|r| r.name == CONFIRMATION_TOOL)
        .expect("resume recorded");
    assert_eq!(resume.id, approval.info.approval_id);
    assert_eq!(resume.response, serde_json::json!({"confirmed": false}));
}

#[tokio::test]
async fn scenario_d_literal_list_yields_two_references() {
    let payload = serde_json::json!({
        "content": [{"type": "text", "text": "[\"http://a/1.png\",\"http://a/2.png\"]"}]
    });
    let s = setup(
        Arc::new(batch_planner()),
        Arc::new(FixedPayloadTool(payload)),
        Arc::new(NeverDecision),
    );

    let report = s
        .controller
        .run(&RunRequest::new("Generate 2 images", false))
        .await
        .unwrap();

    assert_eq!(report.references, vec!["http://a/1.png", "http://a/2.png"]);
    assert_eq!(s.retriever.seen(), vec!["http://a/1.png", "http://a/2.png"]);
}

#[tokio::test]
async fn scenario_e_invalid_payload_still_finishes() {
    let payload = serde_json::json!({
        "content": [{"type": "text", "text": "Error: model unavailable"}]
    });
    let s = setup(
        Arc::new(batch_planner()),
        Arc::new(FixedPayloadTool(payload)),
        Arc::new(NeverDecision),
    );

    let report = s
        .controller
        .run(&RunRequest::new("Generate 2 images", false))
        .await
        .unwrap();

    assert_eq!(report.final_state(), WorkflowState::Done);
    assert!(report.references.is_empty());
    assert!(report.retrievals.is_empty());
}

#[tokio::test]
async fn oversized_bulk_is_refused_before_approval() {
    let images = Arc::new(FakeImageTool::new("generate_image"));
    let s = setup(Arc::new(batch_planner()), images.clone(), Arc::new(NeverDecision));

    let report = s
        .controller
        .run(&RunRequest::new("Generate 500 images", false))
        .await
        .unwrap();

    assert!(report.approval.is_none());
    assert!(images.calls().is_empty());
    let gate = report
        .events
        .iter()
        .flat_map(|e| e.tool_responses())
        .find(|r| r.name == BULK_TOOL)
        .expect("gate answered");
    assert!(gate.response["error"].as_str().unwrap().contains("maximum"));
}

#[test]
fn payload_fixture_matches_extraction_format() {
    let payload = generation_payload(&["http://a/1.png"]);
    assert_eq!(
        pixbatch_agent::extract::parse_refs(&payload),
        vec!["http://a/1.png"]
    );
}
