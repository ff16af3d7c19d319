//! Outgoing model request types.
//!
//! An `LlmRequest` is assembled by the model-call pipeline's request
//! processors: the effective model is resolved, generation config merged,
//! system instructions injected, and every attached tool registers its
//! function declaration before the request leaves the process.

use canopy_core::Content;
use serde::{Deserialize, Serialize};

/// A tool's function declaration sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    /// The tool name.
    pub name: String,

    /// Description of what the tool does.
    pub description: String,

    /// JSON Schema describing the tool's parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

/// Generation configuration merged into the request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateConfig {
    /// System instruction, built up by request processors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,

    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Stop sequences.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,

    /// Declarations of the tools the model may call.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub function_declarations: Vec<FunctionDeclaration>,

    /// Requested output modalities (live mode).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_modalities: Vec<String>,
}

/// A request to a model binding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmRequest {
    /// The model to call. Resolved by the pipeline before dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Message history, oldest first.
    #[serde(default)]
    pub contents: Vec<Content>,

    /// Generation configuration.
    #[serde(default)]
    pub config: GenerateConfig,
}

impl LlmRequest {
    /// Append instruction paragraphs to the system instruction.
    pub fn append_instructions(&mut self, instructions: &[&str]) {
        if instructions.is_empty() {
            return;
        }
        let addition = instructions.join("\n\n");
        self.config.system_instruction = Some(match self.config.system_instruction.take() {
            Some(existing) => format!("{existing}\n\n{addition}"),
            None => addition,
        });
    }

    /// Register a tool's function declaration on this request.
    pub fn append_declaration(&mut self, declaration: FunctionDeclaration) {
        self.config.function_declarations.push(declaration);
    }

    /// Names of all declared tools.
    pub fn declared_tool_names(&self) -> Vec<&str> {
        self.config
            .function_declarations
            .iter()
            .map(|d| d.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_instructions_joins_paragraphs() {
        let mut request = LlmRequest::default();
        request.append_instructions(&["You are a helper."]);
        request.append_instructions(&["Be brief.", "Use tools when useful."]);
        let instruction = request.config.system_instruction.unwrap();
        assert_eq!(
            instruction,
            "You are a helper.\n\nBe brief.\n\nUse tools when useful."
        );
    }

    #[test]
    fn declared_tool_names() {
        let mut request = LlmRequest::default();
        request.append_declaration(FunctionDeclaration {
            name: "lookup".into(),
            description: "Look things up".into(),
            parameters: None,
        });
        assert_eq!(request.declared_tool_names(), vec!["lookup"]);
    }
}
