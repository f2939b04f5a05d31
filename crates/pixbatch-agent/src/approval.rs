use futures::future::BoxFuture;
use tracing::debug;

use pixbatch_core::error::Result;
use pixbatch_core::traits::DecisionSource;
use pixbatch_core::types::ApprovalPrompt;

/// Answers accepted as approval, compared case-insensitively after trimming.
pub const AFFIRMATIVE: &[&str] = &["yes", "y", "approve"];

/// Map free-form input to a decision. Anything unrecognized rejects.
pub fn parse_decision(input: &str) -> bool {
    let normalized = input.trim().to_lowercase();
    AFFIRMATIVE.contains(&normalized.as_str())
}

/// Question shown to the human for a paused bulk.
pub fn prompt_text(prompt: &ApprovalPrompt) -> String {
    match (&prompt.hint, prompt.requested_count) {
        (Some(hint), _) => hint.clone(),
        (None, Some(n)) => format!("Approve generating {} images?", n),
        (None, None) => format!(
            "Approve this bulk (more than {} images)?",
            prompt.threshold
        ),
    }
}

/// Always gives the same decision.
pub struct FixedDecision(pub bool);

impl DecisionSource for FixedDecision {
    fn decide<'a>(&'a self, prompt: &'a ApprovalPrompt) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            debug!(approval_id = %prompt.approval_id, approved = self.0, "Fixed decision");
            Ok(self.0)
        })
    }
}

/// Decides from a pre-supplied answer string, as if the human had typed it.
pub struct AnswerDecision {
    answer: String,
}

impl AnswerDecision {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
        }
    }
}

impl DecisionSource for AnswerDecision {
    fn decide<'a>(&'a self, prompt: &'a ApprovalPrompt) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let approved = parse_decision(&self.answer);
            debug!(approval_id = %prompt.approval_id, answer = %self.answer, approved, "Scripted answer");
            Ok(approved)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> ApprovalPrompt {
        ApprovalPrompt {
            approval_id: "adk-1".into(),
            hint: None,
            requested_count: Some(6),
            threshold: 4,
        }
    }

    #[test]
    fn affirmative_tokens_approve() {
        for input in ["yes", "Y", "  approve\n", "YES"] {
            assert!(parse_decision(input), "{input:?}");
        }
    }

    #[test]
    fn everything_else_rejects() {
        for input in ["no", "", "yeah", "ok", "approved", "n"] {
            assert!(!parse_decision(input), "{input:?}");
        }
    }

    #[test]
    fn prompt_prefers_hint() {
        let mut p = prompt();
        assert_eq!(prompt_text(&p), "Approve generating 6 images?");
        p.hint = Some("Proceed with 6?".into());
        assert_eq!(prompt_text(&p), "Proceed with 6?");
        p.hint = None;
        p.requested_count = None;
        assert!(prompt_text(&p).contains("more than 4"));
    }

    #[tokio::test]
    async fn answer_decision_parses_input() {
        assert!(AnswerDecision::new("y").decide(&prompt()).await.unwrap());
        assert!(!AnswerDecision::new("nope").decide(&prompt()).await.unwrap());
        assert!(FixedDecision(true).decide(&prompt()).await.unwrap());
    }
}
