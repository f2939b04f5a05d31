use pixbatch_core::types::{ApprovalInfo, Part, TurnEvent, CONFIRMATION_TOOL};

/// Find the first pending-approval signal in event order, then part order.
pub fn scan(events: &[TurnEvent]) -> Option<ApprovalInfo> {
    scan_all(events).into_iter().next()
}

/// Every pending-approval signal in the sequence, in encounter order.
pub fn scan_all(events: &[TurnEvent]) -> Vec<ApprovalInfo> {
    let mut found = Vec::new();
    for event in events {
        for part in &event.parts {
            match part {
                Part::ToolCall(call) if call.name == CONFIRMATION_TOOL => {
                    found.push(ApprovalInfo {
                        approval_id: call.id.clone(),
                        invocation_id: event.invocation_id.clone(),
                    });
                }
                Part::ToolCall(_) | Part::Text { .. } | Part::ToolResponse(_) => {}
            }
        }
    }
    found
}

/// Hint text carried by the confirmation call with the given id.
pub fn confirmation_hint(events: &[TurnEvent], approval_id: &str) -> Option<String> {
    confirmation_args(events, approval_id)
        .and_then(|args| args.pointer("/toolConfirmation/hint").cloned())
        .and_then(|hint| hint.as_str().map(str::to_string))
}

/// Count the confirmation payload asked about, if the call carried one.
pub fn confirmation_count(events: &[TurnEvent], approval_id: &str) -> Option<u64> {
    confirmation_args(events, approval_id)
        .and_then(|args| args.pointer("/toolConfirmation/payload/bulk_size").cloned())
        .and_then(|n| n.as_u64())
}

fn confirmation_args<'a>(events: &'a [TurnEvent], approval_id: &str) -> Option<&'a serde_json::Value> {
    events
        .iter()
        .flat_map(|e| e.tool_calls())
        .find(|call| call.name == CONFIRMATION_TOOL && call.id == approval_id)
        .map(|call| &call.args)
}
