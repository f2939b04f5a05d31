use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use futures::future::BoxFuture;

use pixbatch_core::error::{PixbatchError, Result};
use pixbatch_core::traits::{DecisionSource, ImageRetriever, Tool};
use pixbatch_core::types::*;

use crate::fixtures::generation_payload;

/// Image generation tool answering with sequential fake URLs.
pub struct FakeImageTool {
    name: String,
    base_url: String,
    issued: AtomicUsize,
    calls: Mutex<Vec<u32>>,
}

impl FakeImageTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: "https://images.test".into(),
            issued: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// `num_outputs` of every call so far.
    pub fn calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }
}

impl Tool for FakeImageTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Generate images from a prompt."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "prompt": { "type": "string" },
                "num_outputs": { "type": "integer" }
            },
            "required": ["num_outputs"]
        })
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let n = input
                .get("num_outputs")
                .and_then(|v| v.as_u64())
                .ok_or_else(|| PixbatchError::ToolValidation("num_outputs is required".into()))?
                as u32;
            self.calls.lock().unwrap().push(n);

            let urls: Vec<String> = (0..n)
                .map(|_| {
                    let i = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
                    format!("{}/{}.png", self.base_url, i)
                })
                .collect();
            let refs: Vec<&str> = urls.iter().map(String::as_str).collect();
            Ok(ToolResult::success(generation_payload(&refs)))
        })
    }
}

/// Decision source that never answers.
pub struct NeverDecision;

impl DecisionSource for NeverDecision {
    fn decide<'a>(&'a self, _prompt: &'a ApprovalPrompt) -> BoxFuture<'a, Result<bool>> {
        Box::pin(futures::future::pending())
    }
}

/// Retriever that records references and reports each as saved.
#[derive(Default)]
pub struct RecordingRetriever {
    seen: Mutex<Vec<String>>,
}

impl RecordingRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl ImageRetriever for RecordingRetriever {
    fn retrieve<'a>(&'a self, references: &'a [String]) -> BoxFuture<'a, Vec<RetrievalOutcome>> {
        Box::pin(async move {
            self.seen.lock().unwrap().extend(references.iter().cloned());
            references
                .iter()
                .enumerate()
                .map(|(i, reference)| RetrievalOutcome::Saved {
                    index: i + 1,
                    reference: reference.clone(),
                    path: PathBuf::from(format!("generated_image_{}.png", i + 1)),
                })
                .collect()
        })
    }
}
