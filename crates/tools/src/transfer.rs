//! Transfer tool — lets a model hand the invocation to another agent.

use async_trait::async_trait;
use canopy_core::ToolError;
use canopy_models::FunctionDeclaration;
use tracing::debug;

use crate::context::ToolContext;
use crate::tool::Tool;

/// Sets `transfer_to_agent` on the current event's actions; the pipeline's
/// delegate step resolves the name from the tree root and hands over the
/// remainder of the invocation.
pub struct TransferToAgentTool;

#[async_trait]
impl Tool for TransferToAgentTool {
    fn name(&self) -> &str {
        "transfer_to_agent"
    }

    fn description(&self) -> &str {
        "Transfers the conversation to another agent. Use when a different \
         agent in the tree is better suited to continue."
    }

    fn declaration(&self) -> Option<FunctionDeclaration> {
        Some(FunctionDeclaration {
            name: self.name().into(),
            description: self.description().into(),
            parameters: Some(serde_json::json!({
                "type": "object",
                "properties": {
                    "agent_name": {
                        "type": "string",
                        "description": "Name of the agent to transfer to"
                    }
                },
                "required": ["agent_name"]
            })),
        })
    }

    async fn run(
        &self,
        args: serde_json::Map<String, serde_json::Value>,
        ctx: &mut ToolContext,
    ) -> std::result::Result<serde_json::Value, ToolError> {
        let target = args
            .get("agent_name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'agent_name' argument".into()))?;

        debug!(from = ctx.agent_name(), to = target, "transfer_to_agent requested");
        ctx.actions_mut().transfer_to_agent = Some(target.to_string());
        Ok(serde_json::json!({}))
    }
}
