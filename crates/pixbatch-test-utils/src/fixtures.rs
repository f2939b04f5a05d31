use pixbatch_core::types::*;

/// Author used for model-side fixture events.
pub const AGENT: &str = "image_agent";

/// Name of the bulk gate tool as seen in event logs.
pub const GATE_TOOL: &str = "generate_image_bulk";

/// Name of the external generation tool as seen in event logs.
pub const GENERATION_TOOL: &str = "generate_image";

/// MCP-shaped generation payload listing `urls` as one text item.
pub fn generation_payload(urls: &[&str]) -> serde_json::Value {
    let list: Vec<String> = urls.iter().map(|u| u.to_string()).collect();
    serde_json::json!({
        "content": [{
            "type": "text",
            "text": serde_json::Value::from(list).to_string(),
        }],
        "isError": false,
    })
}

pub fn model_text_event(invocation_id: &str, text: &str) -> TurnEvent {
    TurnEvent::new(invocation_id, AGENT, vec![Part::text(text)])
}

/// A gate response with the given status for `bulk_size` images.
pub fn gate_response_event(invocation_id: &str, status: &str, bulk_size: u32) -> TurnEvent {
    TurnEvent::new(
        invocation_id,
        AGENT,
        vec![Part::ToolResponse(ToolResponse {
            id: format!("call-gate-{}", bulk_size),
            name: GATE_TOOL.into(),
            response: serde_json::json!({
                "status": status,
                "message": format!("Generation for {} images: {}", bulk_size, status),
            }),
        })],
    )
}

/// A confirmation request pausing the gate for `bulk_size` images.
pub fn confirmation_event(invocation_id: &str, approval_id: &str, bulk_size: u32) -> TurnEvent {
    TurnEvent::new(
        invocation_id,
        AGENT,
        vec![Part::ToolCall(ToolCall {
            id: approval_id.into(),
            name: CONFIRMATION_TOOL.into(),
            args: serde_json::json!({
                "originalFunctionCall": {
                    "id": format!("call-gate-{}", bulk_size),
                    "name": GATE_TOOL,
                    "args": { "bulk_size": bulk_size },
                },
                "toolConfirmation": {
                    "hint": format!("Do you want to proceed with {} images?", bulk_size),
                    "confirmed": false,
                    "payload": { "bulk_size": bulk_size },
                },
            }),
        })],
    )
}

/// A generation tool response carrying `urls`.
pub fn generation_event(invocation_id: &str, urls: &[&str]) -> TurnEvent {
    TurnEvent::new(
        invocation_id,
        AGENT,
        vec![Part::ToolResponse(ToolResponse {
            id: format!("call-gen-{}", uuid::Uuid::new_v4()),
            name: GENERATION_TOOL.into(),
            response: generation_payload(urls),
        })],
    )
}
