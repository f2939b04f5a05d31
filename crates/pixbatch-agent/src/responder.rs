use pixbatch_core::types::{ApprovalInfo, Message, Part, Role, ToolResponse, CONFIRMATION_TOOL};

/// Build the user message answering a pending approval.
///
/// The runtime matches it to the paused call purely by `approval_id`.
pub fn build_resume_message(info: &ApprovalInfo, approved: bool) -> Message {
    Message {
        role: Role::User,
        parts: vec![Part::ToolResponse(ToolResponse {
            id: info.approval_id.clone(),
            name: CONFIRMATION_TOOL.to_string(),
            response: serde_json::json!({ "confirmed": approved }),
        })],
    }
}
