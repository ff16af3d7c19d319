//! Incoming model response types.

use canopy_core::Content;
use serde::{Deserialize, Serialize};

/// Token usage statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One response chunk from a model binding.
///
/// A streaming call yields any number of `partial` chunks followed by a
/// finalized chunk carrying the aggregated content and usage. A
/// non-streaming call yields exactly one finalized chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Generated content, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,

    /// In-flight streaming text; superseded by the finalized chunk.
    #[serde(default)]
    pub partial: bool,

    /// The live turn is complete (bidirectional mode).
    #[serde(default)]
    pub turn_complete: bool,

    /// The generation was interrupted (bidirectional mode).
    #[serde(default)]
    pub interrupted: bool,

    /// Provider error code, when the response reports a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    /// Human-readable error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Token usage (typically only on the finalized chunk).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Why generation stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

impl LlmResponse {
    /// A finalized text response.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Some(Content::model_text(text)),
            ..Default::default()
        }
    }

    /// A partial streaming text chunk.
    pub fn partial_text(text: impl Into<String>) -> Self {
        Self {
            content: Some(Content::model_text(text)),
            partial: true,
            ..Default::default()
        }
    }

    /// A finalized response with arbitrary content.
    pub fn with_content(content: Content) -> Self {
        Self {
            content: Some(content),
            ..Default::default()
        }
    }

    /// Whether this chunk reports a provider-side failure.
    pub fn is_error(&self) -> bool {
        self.error_code.is_some()
    }
}
