//! Agent and model lifecycle callbacks.
//!
//! Callbacks observe and steer execution at well-defined points: before and
//! after an agent's body, and before and after each model call. State writes
//! made through the callback context ride the resulting event's state delta.

use std::sync::Arc;

use canopy_core::state::State;
use canopy_core::{Content, EventActions};
use canopy_models::{LlmRequest, LlmResponse};

/// Context handed to lifecycle callbacks.
pub struct CallbackContext {
    agent_name: String,
    invocation_id: String,
    state: State,
    actions: EventActions,
}

impl CallbackContext {
    pub fn new(
        agent_name: impl Into<String>,
        invocation_id: impl Into<String>,
        state: State,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            invocation_id: invocation_id.into(),
            state,
            actions: EventActions::default(),
        }
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    /// Read a state key (pending writes visible).
    pub fn get_state(&self, key: &str) -> Option<&serde_json::Value> {
        self.state.get(key)
    }

    /// Write a state key; becomes durable via the resulting event.
    pub fn set_state(&mut self, key: impl Into<String>, value: serde_json::Value) {
        let key = key.into();
        self.state.set(key.clone(), value.clone());
        self.actions.state_delta.insert(key, value);
    }

    /// Side effects requested so far.
    pub fn actions(&self) -> &EventActions {
        &self.actions
    }

    /// Whether this callback wrote any state.
    pub fn has_state_delta(&self) -> bool {
        !self.actions.state_delta.is_empty()
    }

    /// Consume the context, yielding its accumulated actions.
    pub fn into_actions(self) -> EventActions {
        self.actions
    }
}

/// Runs before an agent's body. Returning content short-circuits the body
/// and ends the invocation.
pub type BeforeAgentCallback = Arc<dyn Fn(&mut CallbackContext) -> Option<Content> + Send + Sync>;

/// Runs after an agent's body. Returning content appends a trailing event.
pub type AfterAgentCallback = Arc<dyn Fn(&mut CallbackContext) -> Option<Content> + Send + Sync>;

/// Runs before each model call. Returning a response skips the call.
pub type BeforeModelCallback =
    Arc<dyn Fn(&mut CallbackContext, &LlmRequest) -> Option<LlmResponse> + Send + Sync>;

/// Runs on each streamed chunk. Returning a response substitutes the chunk.
pub type AfterModelCallback =
    Arc<dyn Fn(&mut CallbackContext, &LlmResponse) -> Option<LlmResponse> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_state_records_delta() {
        let mut ctx = CallbackContext::new("helper", "inv_1", State::default());
        assert!(!ctx.has_state_delta());

        ctx.set_state("greeted", serde_json::json!(true));
        assert!(ctx.has_state_delta());
        assert_eq!(ctx.get_state("greeted"), Some(&serde_json::json!(true)));

        let actions = ctx.into_actions();
        assert_eq!(actions.state_delta.get("greeted"), Some(&serde_json::json!(true)));
    }
}
