//! Exit-loop tool — lets a model break out of an enclosing loop agent.

use async_trait::async_trait;
use canopy_core::ToolError;
use canopy_models::FunctionDeclaration;
use tracing::debug;

use crate::context::ToolContext;
use crate::tool::Tool;

/// Sets `escalate` on the current event's actions, which stops the
/// innermost enclosing loop agent after this event is yielded.
pub struct ExitLoopTool;

#[async_trait]
impl Tool for ExitLoopTool {
    fn name(&self) -> &str {
        "exit_loop"
    }

    fn description(&self) -> &str {
        "Exits the current loop. Call this only when the task is finished \
         and no further iterations are needed."
    }

    fn declaration(&self) -> Option<FunctionDeclaration> {
        Some(FunctionDeclaration {
            name: self.name().into(),
            description: self.description().into(),
            parameters: Some(serde_json::json!({
                "type": "object",
                "properties": {}
            })),
        })
    }

    async fn run(
        &self,
        _args: serde_json::Map<String, serde_json::Value>,
        ctx: &mut ToolContext,
    ) -> std::result::Result<serde_json::Value, ToolError> {
        debug!(agent = ctx.agent_name(), "exit_loop requested");
        ctx.actions_mut().escalate = true;
        Ok(serde_json::json!({}))
    }
}
