//! # Canopy Core
//!
//! Domain types and error definitions for the Canopy agent orchestration
//! engine. This crate has **zero framework dependencies** — it defines the
//! value objects that all other crates build on: content parts, events and
//! their requested side effects, layered session state, and run-scoped
//! configuration.

pub mod content;
pub mod error;
pub mod event;
pub mod run_config;
pub mod state;

// Re-export key types at crate root for ergonomics
pub use content::{Content, FunctionCall, FunctionResponse, Part, ROLE_MODEL, ROLE_USER};
pub use error::{Error, ModelError, RemoteAgentError, Result, SessionError, ToolError};
pub use event::{Event, EventActions, USER_AUTHOR};
pub use run_config::{RunConfig, StreamingMode};
pub use state::{APP_PREFIX, State, TEMP_PREFIX, USER_PREFIX};
