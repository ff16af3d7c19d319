//! # Canopy Tools
//!
//! The tool contract: declarations sent to the model, per-call execution
//! contexts, and the built-in control-flow tools (`exit_loop`,
//! `transfer_to_agent`) that steer orchestration through event actions.

pub mod context;
pub mod exit_loop;
pub mod tool;
pub mod transfer;

pub use context::ToolContext;
pub use exit_loop::ExitLoopTool;
pub use tool::Tool;
pub use transfer::TransferToAgentTool;
