//! Test doubles and fixtures shared by pixbatch crates.
//!
//! [`ScriptedRuntime`] replays canned event batches in place of a real agent
//! runtime; [`ScriptedPlanner`] does the same one level lower for the bundled
//! runtime. The fixture builders produce events shaped like a live run.

mod fixtures;
mod fakes;
mod scripted;

pub use fakes::{FakeImageTool, NeverDecision, RecordingRetriever};
pub use fixtures::*;
pub use scripted::{ResumeCall, ScriptedPlanner, ScriptedRuntime};
