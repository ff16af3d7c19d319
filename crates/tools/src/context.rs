//! Tool execution context.
//!
//! One `ToolContext` exists per function call. State writes land in the
//! context's `EventActions` and become durable only when the resulting
//! function-response event is appended to the session; artifact saves are
//! recorded in the actions' artifact delta the same way.

use std::sync::Arc;

use canopy_core::content::Part;
use canopy_core::state::State;
use canopy_core::{EventActions, SessionError};
use canopy_sessions::ArtifactStore;

/// Per-function-call execution context handed to a tool.
pub struct ToolContext {
    app_name: String,
    user_id: String,
    session_id: String,
    invocation_id: String,
    agent_name: String,
    function_call_id: Option<String>,
    state: State,
    actions: EventActions,
    artifact_store: Arc<dyn ArtifactStore>,
}

impl ToolContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        invocation_id: impl Into<String>,
        agent_name: impl Into<String>,
        function_call_id: Option<String>,
        state: State,
        artifact_store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
            invocation_id: invocation_id.into(),
            agent_name: agent_name.into(),
            function_call_id,
            state,
            actions: EventActions::default(),
            artifact_store,
        }
    }

    /// The invocation this call belongs to.
    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    /// The agent whose model requested this call.
    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// The id of the function call being executed.
    pub fn function_call_id(&self) -> Option<&str> {
        self.function_call_id.as_deref()
    }

    /// Read a state key (pending writes visible).
    pub fn get_state(&self, key: &str) -> Option<&serde_json::Value> {
        self.state.get(key)
    }

    /// Write a state key; becomes durable via the event's state delta.
    pub fn set_state(&mut self, key: impl Into<String>, value: serde_json::Value) {
        let key = key.into();
        self.state.set(key.clone(), value.clone());
        self.actions.state_delta.insert(key, value);
    }

    /// The side effects requested so far.
    pub fn actions(&self) -> &EventActions {
        &self.actions
    }

    /// Mutable access for tools that steer orchestration.
    pub fn actions_mut(&mut self) -> &mut EventActions {
        &mut self.actions
    }

    /// Consume the context, yielding its accumulated actions.
    pub fn into_actions(self) -> EventActions {
        self.actions
    }

    /// Save an artifact; the new version is recorded in the artifact delta.
    pub async fn save_artifact(
        &mut self,
        filename: &str,
        part: Part,
    ) -> Result<u64, SessionError> {
        let version = self
            .artifact_store
            .save_artifact(&self.app_name, &self.user_id, &self.session_id, filename, part)
            .await?;
        self.actions
            .artifact_delta
            .insert(filename.to_string(), version);
        Ok(version)
    }

    /// Load an artifact (latest version when None).
    pub async fn load_artifact(
        &self,
        filename: &str,
        version: Option<u64>,
    ) -> Result<Option<Part>, SessionError> {
        self.artifact_store
            .load_artifact(&self.app_name, &self.user_id, &self.session_id, filename, version)
            .await
    }

    /// Filenames visible to this session.
    pub async fn list_artifact_keys(&self) -> Result<Vec<String>, SessionError> {
        self.artifact_store
            .list_artifact_keys(&self.app_name, &self.user_id, &self.session_id)
            .await
    }
}

/// Context constructors for tests.
pub mod testing {
    use super::*;
    use canopy_sessions::InMemoryArtifactStore;

    /// A minimal tool context over an empty in-memory artifact store.
    pub fn tool_context() -> ToolContext {
        ToolContext::new(
            "test_app",
            "test_user",
            "test_session",
            "inv_test",
            "test_agent",
            Some("call_test".into()),
            State::default(),
            Arc::new(InMemoryArtifactStore::new()),
        )
    }
}
