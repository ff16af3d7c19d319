//! Error types for the Canopy engine.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum, folded into the top-level
//! `Error`. Configuration errors (invalid agent name, re-parenting,
//! unresolved transfer target, missing model binding) surface as
//! `Error::Config` at construction or first use and are never retried.

use thiserror::Error;

/// The top-level error type for all Canopy operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Configuration errors (fatal, never retried) ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Model errors ---
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Session errors ---
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    // --- Remote agent errors ---
    #[error("Remote agent error: {0}")]
    Remote(#[from] RemoteAgentError),

    // --- Resource guards ---
    #[error("Maximum number of model calls exceeded ({limit})")]
    LlmCallsLimitExceeded { limit: u32 },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("No model binding registered for: {0}")]
    NotFound(String),

    #[error("Model not configured: {0}")]
    NotConfigured(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),
}

#[derive(Debug, Error)]
pub enum RemoteAgentError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Remote agent returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid remote payload: {0}")]
    InvalidPayload(String),
}
