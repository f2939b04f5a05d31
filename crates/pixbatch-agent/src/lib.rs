pub mod approval;
pub mod extract;
pub mod gate;
pub mod planner;
pub mod registry;
pub mod responder;
pub mod retrieve;
pub mod runtime;
pub mod scanner;
pub mod session;
pub mod workflow;

pub use approval::{parse_decision, AnswerDecision, FixedDecision};
pub use gate::{BulkGenerateTool, ConfirmationGate, GateDecision, BULK_TOOL};
pub use planner::{plan_batches, BatchPlanner};
pub use registry::ToolRegistry;
pub use retrieve::HttpRetriever;
pub use runtime::LocalRuntime;
pub use session::InMemorySessionStore;
pub use workflow::{WorkflowContext, WorkflowController, WorkflowReport, WorkflowState};
