//! Per-run configuration carried on the invocation context.

use serde::{Deserialize, Serialize};

/// How model responses are delivered for this run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamingMode {
    /// Complete responses only.
    #[default]
    None,
    /// Server-side streaming: partial events followed by a final event.
    Sse,
    /// Bidirectional live connection.
    Bidi,
}

/// Configuration for one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Response delivery mode.
    #[serde(default)]
    pub streaming_mode: StreamingMode,

    /// Output modalities requested from the model (e.g. "TEXT", "AUDIO").
    #[serde(default)]
    pub response_modalities: Vec<String>,

    /// Save inbound binary blobs as artifacts instead of inlining them.
    #[serde(default)]
    pub save_input_blobs_as_artifacts: bool,

    /// Upper bound on model calls per invocation (runaway-pipeline guard).
    #[serde(default = "default_max_llm_calls")]
    pub max_llm_calls: u32,
}

fn default_max_llm_calls() -> u32 {
    500
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            streaming_mode: StreamingMode::None,
            response_modalities: Vec::new(),
            save_input_blobs_as_artifacts: false,
            max_llm_calls: default_max_llm_calls(),
        }
    }
}
