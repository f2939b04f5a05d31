use futures::future::BoxFuture;
use regex::Regex;
use tracing::debug;

use pixbatch_core::config::AgentConfig;
use pixbatch_core::error::{PixbatchError, Result};
use pixbatch_core::traits::Planner;
use pixbatch_core::types::*;

use crate::gate::BULK_TOOL;

const NUMBER_WORDS: &[(&str, u32)] = &[
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
    ("eleven", 11),
    ("twelve", 12),
];

/// Split `total` images into generation calls of at most `per_call` each.
///
/// Every call is full except possibly the last, which carries the remainder.
pub fn plan_batches(total: u32, per_call: u32) -> Vec<u32> {
    if total == 0 || per_call == 0 {
        return Vec::new();
    }
    let mut batches = vec![per_call; (total / per_call) as usize];
    let rest = total % per_call;
    if rest > 0 {
        batches.push(rest);
    }
    batches
}

/// Deterministic planner for image bulk requests.
///
/// Reads the requested count from the latest user text naming one, calls the
/// bulk gate, and on approval fans out generation calls via [`plan_batches`].
pub struct BatchPlanner {
    generation_tool: String,
    max_images_per_call: u32,
    count_pattern: Regex,
}

/// The request a planner turn is working on.
struct Request<'h> {
    count: u32,
    prompt: String,
    since: &'h [TurnEvent],
}

impl BatchPlanner {
    pub fn new(config: &AgentConfig, generation_tool: impl Into<String>) -> Result<Self> {
        let words: Vec<&str> = NUMBER_WORDS.iter().map(|(w, _)| *w).collect();
        let pattern = format!(r"(?i)\b(\d+|{})\b", words.join("|"));
        let count_pattern =
            Regex::new(&pattern).map_err(|e| PixbatchError::Config(e.to_string()))?;
        Ok(Self {
            generation_tool: generation_tool.into(),
            max_images_per_call: config.max_images_per_call.max(1),
            count_pattern,
        })
    }

    /// First count mentioned in `text`, as digits or a small number word.
    pub fn requested_count(&self, text: &str) -> Option<u32> {
        let word = self.count_pattern.captures(text)?.get(1)?.as_str();
        if let Ok(n) = word.parse::<u32>() {
            return Some(n);
        }
        let word = word.to_lowercase();
        NUMBER_WORDS
            .iter()
            .find(|(w, _)| *w == word)
            .map(|(_, n)| *n)
    }

    fn current_request<'h>(&self, history: &'h [TurnEvent]) -> Option<Request<'h>> {
        history.iter().enumerate().rev().find_map(|(i, event)| {
            if !event.is_user() {
                return None;
            }
            let prompt = event.text();
            let count = self.requested_count(&prompt)?;
            Some(Request {
                count,
                prompt,
                since: &history[i + 1..],
            })
        })
    }

    fn plan(&self, history: &[TurnEvent]) -> Message {
        let Some(request) = self.current_request(history) else {
            return reply("How many images would you like me to generate, and of what?");
        };
        let n = request.count;

        let responses: Vec<&ToolResponse> = request
            .since
            .iter()
            .flat_map(|e| e.tool_responses())
            .collect();
        let gate = responses.iter().rev().find(|r| r.name == BULK_TOOL);
        let generated = responses
            .iter()
            .filter(|r| r.name == self.generation_tool)
            .count();

        let Some(gate) = gate else {
            debug!(bulk_size = n, "Checking bulk with the gate");
            return Message::model(vec![
                Part::text(format!("Checking whether {} images can be generated.", n)),
                Part::ToolCall(ToolCall::new(
                    BULK_TOOL,
                    serde_json::json!({ "bulk_size": n }),
                )),
            ]);
        };

        if let Some(error) = gate.response.get("error").and_then(|e| e.as_str()) {
            return reply(format!("I can't start this bulk: {}", error));
        }

        match gate.response.get("status").and_then(|s| s.as_str()) {
            Some("pending") => reply(format!(
                "Generating {} images needs your approval before I continue.",
                n
            )),
            Some("rejected") => reply(format!(
                "The bulk of {} images was rejected, so nothing was generated.",
                n
            )),
            Some("success") | Some("approved") if generated == 0 => {
                let batches = plan_batches(n, self.max_images_per_call);
                debug!(bulk_size = n, calls = batches.len(), "Fanning out generation");
                let mut parts = vec![Part::text(format!(
                    "Generating {} images in {} call(s).",
                    n,
                    batches.len()
                ))];
                parts.extend(batches.into_iter().map(|k| {
                    Part::ToolCall(ToolCall::new(
                        self.generation_tool.clone(),
                        serde_json::json!({ "prompt": request.prompt, "num_outputs": k }),
                    ))
                }));
                Message::model(parts)
            }
            Some("success") | Some("approved") => reply(format!(
                "Finished generating {} images in {} call(s).",
                n, generated
            )),
            other => reply(format!(
                "The bulk gate answered with an unexpected status: {}",
                other.unwrap_or("none")
            )),
        }
    }
}

fn reply(text: impl Into<String>) -> Message {
    Message::model(vec![Part::text(text)])
}

impl Planner for BatchPlanner {
    fn next_turn<'a>(
        &'a self,
        history: &'a [TurnEvent],
        _tools: &'a [ToolDefinition],
    ) -> BoxFuture<'a, Result<Message>> {
        Box::pin(async move { Ok(self.plan(history)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner() -> BatchPlanner {
        BatchPlanner::new(&AgentConfig::default(), "generate_image").unwrap()
    }

    fn user(text: &str) -> TurnEvent {
        TurnEvent::new("e-1", "user", vec![Part::text(text)])
    }

    fn gate_response(status: &str) -> TurnEvent {
        TurnEvent::new(
            "e-1",
            "image_agent",
            vec![Part::ToolResponse(ToolResponse {
                id: "call-1".into(),
                name: BULK_TOOL.into(),
                response: serde_json::json!({ "status": status }),
            })],
        )
    }

    #[test]
    fn batches_split_with_remainder_last() {
        assert_eq!(plan_batches(6, 4), vec![4, 2]);
        assert_eq!(plan_batches(8, 4), vec![4, 4]);
        assert_eq!(plan_batches(3, 4), vec![3]);
        assert_eq!(plan_batches(9, 4), vec![4, 4, 1]);
        assert!(plan_batches(0, 4).is_empty());
        assert!(plan_batches(5, 0).is_empty());
    }

    #[test]
    fn reads_digits_and_number_words() {
        let p = planner();
        assert_eq!(p.requested_count("Generate 6 images of a cat"), Some(6));
        assert_eq!(p.requested_count("Make Three portraits"), Some(3));
        assert_eq!(p.requested_count("draw a cat"), None);
        assert_eq!(p.requested_count("someone draw"), None);
    }

    #[test]
    fn first_turn_calls_gate() {
        let msg = planner().plan(&[user("Generate 3 images of a lighthouse")]);
        let calls = msg.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, BULK_TOOL);
        assert_eq!(calls[0].args["bulk_size"], 3);
    }

    #[test]
    fn approval_fans_out_generation() {
        let history = vec![user("Generate 6 images of a lighthouse"), gate_response("approved")];
        let msg = planner().plan(&history);
        let sizes: Vec<u64> = msg
            .tool_calls()
            .iter()
            .map(|c| c.args["num_outputs"].as_u64().unwrap())
            .collect();
        assert_eq!(sizes, vec![4, 2]);
        assert!(msg.tool_calls().iter().all(|c| c.name == "generate_image"));
    }

    #[test]
    fn pending_and_rejected_stop_with_text() {
        for status in ["pending", "rejected"] {
            let history = vec![user("Generate 6 images"), gate_response(status)];
            let msg = planner().plan(&history);
            assert!(msg.tool_calls().is_empty(), "{status}");
            assert!(!msg.text().is_empty());
        }
    }

    #[test]
    fn nudge_text_falls_back_to_earlier_request() {
        let history = vec![
            user("Generate 5 images"),
            gate_response("approved"),
            user("Please proceed with generating the images now."),
        ];
        let msg = planner().plan(&history);
        assert_eq!(msg.tool_calls().len(), 2);
    }

    #[test]
    fn gate_error_is_reported() {
        let history = vec![
            user("Generate 500 images"),
            TurnEvent::new(
                "e-1",
                "image_agent",
                vec![Part::ToolResponse(ToolResponse {
                    id: "call-1".into(),
                    name: BULK_TOOL.into(),
                    response: serde_json::json!({ "error": "too many" }),
                })],
            ),
        ];
        let msg = planner().plan(&history);
        assert!(msg.tool_calls().is_empty());
        assert!(msg.text().contains("too many"));
    }

    #[test]
    fn no_count_asks_for_one() {
        let msg = planner().plan(&[user("hello")]);
        assert!(msg.tool_calls().is_empty());
        assert!(msg.text().contains("How many"));
    }
}
