//! Content and Part domain types.
//!
//! A `Content` is one turn's worth of material attributed to a role:
//! user text, model text, function calls, function responses, raw bytes,
//! or the result of executed code. These are the value objects that flow
//! between agents, models, and tools.

use serde::{Deserialize, Serialize};

/// Role string for content authored by the end user.
pub const ROLE_USER: &str = "user";

/// Role string for content authored by a model.
pub const ROLE_MODEL: &str = "model";

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Call id. Assigned client-side when the model omits one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Name of the tool to invoke.
    pub name: String,

    /// Arguments as a JSON object.
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
}

/// The result of executing a function call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    /// The call id this response answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Name of the tool that produced this response.
    pub name: String,

    /// Serializable result payload.
    pub response: serde_json::Value,
}

/// One piece of a `Content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    /// Plain text.
    Text { text: String },

    /// A function call requested by the model.
    FunctionCall(FunctionCall),

    /// A function result produced by tool dispatch.
    FunctionResponse(FunctionResponse),

    /// Raw bytes with a mime type (audio frames, images, ...).
    InlineData {
        mime_type: String,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },

    /// Output of model-initiated code execution.
    CodeExecutionResult { outcome: String, output: String },
}

impl Part {
    /// Create a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    /// Create a function call part.
    pub fn function_call(call: FunctionCall) -> Self {
        Part::FunctionCall(call)
    }

    /// Create a function response part.
    pub fn function_response(response: FunctionResponse) -> Self {
        Part::FunctionResponse(response)
    }

    /// The text payload, if this is a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// A role-attributed sequence of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    /// Who authored these parts ("user" or "model").
    pub role: String,

    /// Ordered parts.
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// Create content with an explicit role.
    pub fn new(role: impl Into<String>, parts: Vec<Part>) -> Self {
        Self {
            role: role.into(),
            parts,
        }
    }

    /// User-authored text content.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(ROLE_USER, vec![Part::text(text)])
    }

    /// Model-authored text content.
    pub fn model_text(text: impl Into<String>) -> Self {
        Self::new(ROLE_MODEL, vec![Part::text(text)])
    }

    /// The first text part, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.parts.iter().find_map(Part::as_text)
    }

    /// Concatenation of all text parts.
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    /// All function calls in order.
    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::FunctionCall(fc) => Some(fc),
                _ => None,
            })
            .collect()
    }

    /// All function responses in order.
    pub fn function_responses(&self) -> Vec<&FunctionResponse> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::FunctionResponse(fr) => Some(fr),
                _ => None,
            })
            .collect()
    }
}

/// Base64 codec for inline byte payloads.
mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
