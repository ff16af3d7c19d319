//! Shared test helpers for orchestration tests.

use std::sync::Arc;

use canopy_core::{Content, Event, FunctionCall, Part, Result, ROLE_MODEL, RunConfig};
use canopy_models::{LlmResponse, ModelRegistry, ScriptedModel};
use canopy_sessions::{InMemoryArtifactStore, InMemorySessionStore, SessionStore};
use futures::StreamExt;

use crate::EventStream;
use crate::agent::Agent;
use crate::invocation::InvocationContext;
use crate::runner::Runner;

/// A context over fresh in-memory stores and an empty session.
pub async fn test_context(agent: Arc<Agent>) -> InvocationContext {
    let session_store = Arc::new(InMemorySessionStore::new());
    let session = session_store
        .create_session("test_app", "test_user", None, Some("test_session".into()))
        .await
        .expect("create session");

    InvocationContext::new(
        agent,
        "inv_test",
        None,
        RunConfig::default(),
        session,
        session_store,
        Arc::new(InMemoryArtifactStore::new()),
        Arc::new(ModelRegistry::new()),
    )
}

/// A runner over fresh in-memory stores with one session, "test_session".
pub async fn test_runner(root: Arc<Agent>) -> Runner {
    let session_store = Arc::new(InMemorySessionStore::new());
    session_store
        .create_session("test_app", "test_user", None, Some("test_session".into()))
        .await
        .expect("create session");

    Runner::new(
        "test_app",
        root,
        session_store,
        Arc::new(InMemoryArtifactStore::new()),
        Arc::new(ModelRegistry::new()),
    )
}

/// An Llm agent whose model answers successive calls with the given texts.
pub fn scripted_agent(name: &str, replies: &[&str]) -> Arc<Agent> {
    let scripts = replies
        .iter()
        .map(|reply| vec![LlmResponse::text(*reply)])
        .collect();
    Agent::llm(name)
        .with_model_instance(Arc::new(ScriptedModel::new("mock-model", scripts)))
        .build()
        .expect("build scripted agent")
}

/// A scripted response carrying one function call.
pub fn function_call_response(name: &str, args: serde_json::Value) -> LlmResponse {
    let args = match args {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    LlmResponse::with_content(Content::new(
        ROLE_MODEL,
        vec![Part::function_call(FunctionCall {
            id: None,
            name: name.into(),
            args,
        })],
    ))
}

/// Drain a stream, panicking on the first error.
pub async fn drain(mut stream: EventStream) -> Vec<Event> {
    let mut events = Vec::new();
    while let Some(item) = stream.next().await {
        events.push(item.expect("event stream errored"));
    }
    events
}

/// Drain a stream, keeping errors.
pub async fn drain_results(mut stream: EventStream) -> Vec<Result<Event>> {
    let mut items = Vec::new();
    while let Some(item) = stream.next().await {
        items.push(item);
    }
    items
}

/// First text of each content-bearing event.
pub fn texts(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| event.content.as_ref())
        .filter_map(|content| content.first_text())
        .map(str::to_string)
        .collect()
}
