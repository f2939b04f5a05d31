use tracing::warn;

use pixbatch_core::types::{Part, TurnEvent};

/// True if any event carries a response from the named tool.
pub fn has_tool_response(events: &[TurnEvent], tool_name: &str) -> bool {
    events
        .iter()
        .flat_map(|e| e.tool_responses())
        .any(|r| r.name == tool_name)
}

/// Collect image references from every response of `tool_name`, in encounter order.
pub fn collect_image_refs(events: &[TurnEvent], tool_name: &str) -> Vec<String> {
    let mut refs = Vec::new();
    for event in events {
        for part in &event.parts {
            match part {
                Part::ToolResponse(resp) if resp.name == tool_name => {
                    refs.extend(parse_refs(&resp.response));
                }
                Part::ToolResponse(_) | Part::ToolCall(_) | Part::Text { .. } => {}
            }
        }
    }
    refs
}

/// Parse references out of a `{"content": [{"type": "text", "text": "[...]"}]}` payload.
///
/// Items that fail to parse are skipped.
pub fn parse_refs(payload: &serde_json::Value) -> Vec<String> {
    let Some(items) = payload.get("content").and_then(|c| c.as_array()) else {
        return Vec::new();
    };

    let mut refs = Vec::new();
    for item in items {
        if item.get("type").and_then(|t| t.as_str()) != Some("text") {
            continue;
        }
        let Some(text) = item.get("text").and_then(|t| t.as_str()) else {
            continue;
        };
        match serde_json::from_str::<Vec<String>>(text) {
            Ok(urls) => refs.extend(urls),
            Err(e) => warn!(error = %e, "Skipping unparseable image list"),
        }
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixbatch_core::types::ToolResponse;

    fn generation_event(id: &str, payload: serde_json::Value) -> TurnEvent {
        TurnEvent::new(
            "e-1",
            "image_agent",
            vec![Part::ToolResponse(ToolResponse {
                id: id.into(),
                name: "generate_image".into(),
                response: payload,
            })],
        )
    }

    #[test]
    fn literal_list_yields_two_refs_in_order() {
        let payload = serde_json::json!({
            "content": [{"type": "text", "text": "[\"http://a/1.png\",\"http://a/2.png\"]"}]
        });
        assert_eq!(parse_refs(&payload), vec!["http://a/1.png", "http://a/2.png"]);
    }

    #[test]
    fn invalid_item_is_skipped_but_siblings_survive() {
        let payload = serde_json::json!({
            "content": [
                {"type": "text", "text": "not json ["},
                {"type": "image", "data": "...."},
                {"type": "text", "text": "{\"url\": \"http://a/x.png\"}"},
                {"type": "text", "text": "[\"http://a/3.png\"]"}
            ]
        });
        assert_eq!(parse_refs(&payload), vec!["http://a/3.png"]);
    }

    #[test]
    fn payload_without_content_yields_nothing() {
        assert!(parse_refs(&serde_json::json!({"status": "success"})).is_empty());
        assert!(parse_refs(&serde_json::json!({"content": "oops"})).is_empty());
        assert!(parse_refs(&serde_json::Value::Null).is_empty());
    }

    #[test]
    fn collects_across_events_only_for_generation_tool() {
        let events = vec![
            generation_event(
                "c1",
                serde_json::json!({"content": [{"type": "text", "text": "[\"http://a/1.png\"]"}]}),
            ),
            TurnEvent::new(
                "e-1",
                "image_agent",
                vec![Part::ToolResponse(ToolResponse {
                    id: "c2".into(),
                    name: "generate_image_bulk".into(),
                    response: serde_json::json!({"content": [{"type": "text", "text": "[\"http://b/1.png\"]"}]}),
                })],
            ),
            generation_event(
                "c3",
                serde_json::json!({"content": [{"type": "text", "text": "[\"http://a/2.png\",\"http://a/3.png\"]"}]}),
            ),
        ];

        assert_eq!(
            collect_image_refs(&events, "generate_image"),
            vec!["http://a/1.png", "http://a/2.png", "http://a/3.png"]
        );
        assert!(has_tool_response(&events, "generate_image"));
        assert!(!has_tool_response(&events, "render"));
    }
}
