//! Tool trait — the abstraction over agent capabilities.
//!
//! Tools are what let an agent act: query systems, mutate session state,
//! or steer the orchestration itself (escalate, transfer). Each tool
//! registers a function declaration on the outgoing request and is looked
//! up by name when the model calls it.

use async_trait::async_trait;
use canopy_core::ToolError;
use canopy_models::{FunctionDeclaration, LlmRequest};

use crate::context::ToolContext;

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// Whether this tool's result arrives out-of-band rather than inline.
    ///
    /// Long-running tools are not awaited by the pipeline; their call ids
    /// are tracked on the event for later correlation.
    fn is_long_running(&self) -> bool {
        false
    }

    /// This tool's function declaration, if it is callable by the model.
    fn declaration(&self) -> Option<FunctionDeclaration>;

    /// Execute the tool with the given arguments.
    async fn run(
        &self,
        args: serde_json::Map<String, serde_json::Value>,
        ctx: &mut ToolContext,
    ) -> std::result::Result<serde_json::Value, ToolError>;

    /// Let the tool contribute to the outgoing request.
    ///
    /// Default: register the declaration. Tools that inject instructions or
    /// rewrite the request override this.
    fn process_request(&self, request: &mut LlmRequest) {
        if let Some(declaration) = self.declaration() {
            request.append_declaration(declaration);
        }
    }
}
