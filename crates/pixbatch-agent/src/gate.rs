use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::{debug, info};

use pixbatch_core::config::WorkflowConfig;
use pixbatch_core::error::{PixbatchError, Result};
use pixbatch_core::traits::Tool;
use pixbatch_core::types::{ConfirmationState, ToolContext, ToolResult};

/// Name the gate is registered under.
pub const BULK_TOOL: &str = "generate_image_bulk";

/// Decision from the confirmation gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Pending,
    Rejected,
}

/// Validated bulk request parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkRequest {
    pub requested_count: u32,
}

#[derive(Deserialize)]
struct BulkInput {
    bulk_size: i64,
}

impl BulkRequest {
    /// Parse tool input, refusing non-positive and oversized counts.
    pub fn parse(input: serde_json::Value, max_bulk_size: u32) -> Result<Self> {
        let raw: BulkInput = serde_json::from_value(input)
            .map_err(|e| PixbatchError::ToolValidation(e.to_string()))?;
        if raw.bulk_size <= 0 {
            return Err(PixbatchError::ToolValidation(format!(
                "bulk_size must be positive, got {}",
                raw.bulk_size
            )));
        }
        if raw.bulk_size > i64::from(max_bulk_size) {
            return Err(PixbatchError::ToolValidation(format!(
                "bulk_size {} exceeds the maximum of {}",
                raw.bulk_size, max_bulk_size
            )));
        }
        let requested_count = u32::try_from(raw.bulk_size)
            .map_err(|e| PixbatchError::ToolValidation(e.to_string()))?;
        Ok(Self { requested_count })
    }
}

/// Re-entrant approval gate for bulk requests.
///
/// The same call is evaluated twice for large bulks: first without
/// confirmation state (pause), then with it (resume).
#[derive(Debug, Clone)]
pub struct ConfirmationGate {
    large_bulk: u32,
}

impl ConfirmationGate {
    pub fn new(large_bulk: u32) -> Self {
        Self { large_bulk }
    }

    pub fn large_bulk(&self) -> u32 {
        self.large_bulk
    }

    /// Pure decision over the count and optional confirmation state.
    pub fn classify(
        &self,
        requested_count: u32,
        confirmation: Option<&ConfirmationState>,
    ) -> GateDecision {
        if requested_count <= self.large_bulk {
            return GateDecision::Proceed;
        }
        match confirmation {
            None => GateDecision::Pending,
            Some(state) if state.confirmed => GateDecision::Proceed,
            Some(_) => GateDecision::Rejected,
        }
    }

    /// Decide for a live call, recording a pause request on `ctx` when pending.
    pub fn decide(&self, requested_count: u32, ctx: &ToolContext) -> GateDecision {
        let decision = self.classify(requested_count, ctx.confirmation.as_ref());
        if decision == GateDecision::Pending {
            ctx.request_confirmation(
                format!(
                    "Bulk larger than {} images require approval. Do you want to proceed with {} images?",
                    self.large_bulk, requested_count
                ),
                serde_json::json!({ "bulk_size": requested_count }),
            );
        }
        decision
    }
}

/// Tool exposing the gate to the agent.
pub struct BulkGenerateTool {
    gate: ConfirmationGate,
    max_bulk_size: u32,
}

impl BulkGenerateTool {
    pub fn new(gate: ConfirmationGate, max_bulk_size: u32) -> Self {
        Self {
            gate,
            max_bulk_size,
        }
    }

    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self::new(ConfirmationGate::new(config.large_bulk), config.max_bulk_size)
    }
}

impl Tool for BulkGenerateTool {
    fn name(&self) -> &str {
        BULK_TOOL
    }

    fn description(&self) -> &str {
        "Check whether a bulk of images may be generated. Must be called before any generation. \
         Bulks above the approval threshold pause for human approval."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "bulk_size": {
                    "type": "integer",
                    "description": "The number of images to generate"
                }
            },
            "required": ["bulk_size"]
        })
    }

    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let request = BulkRequest::parse(input, self.max_bulk_size)?;
            let n = request.requested_count;
            let resumed = ctx.confirmation.is_some();

            debug!(bulk_size = n, resumed, "Bulk gate called");

            let response = match self.gate.decide(n, &ctx) {
                GateDecision::Proceed if n <= self.gate.large_bulk() => serde_json::json!({
                    "status": "success",
                    "message": format!("Generation for {} images approved. Please proceed with generation.", n),
                }),
                GateDecision::Proceed => serde_json::json!({
                    "status": "approved",
                    "message": format!("Generation for {} images has been approved. Please proceed with generation.", n),
                }),
                GateDecision::Pending => {
                    info!(bulk_size = n, "Bulk requires approval, pausing");
                    serde_json::json!({
                        "status": "pending",
                        "message": format!("Generation for {} images is awaiting approval. Do not generate images until approved.", n),
                    })
                }
                GateDecision::Rejected => serde_json::json!({
                    "status": "rejected",
                    "message": format!("Bulk for {} images was rejected. Do not generate any images.", n),
                }),
            };

            Ok(ToolResult::success(response))
        })
    }
}
