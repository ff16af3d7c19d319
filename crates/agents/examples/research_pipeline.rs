//! A small end-to-end tour: a sequential pipeline whose first stage fans
//! out to two parallel workers, driven by the runner against scripted
//! models. Run with `cargo run --example research_pipeline -p canopy-agents`.

use std::sync::Arc;

use canopy_agents::{Agent, Runner};
use canopy_core::{Content, RunConfig};
use canopy_models::{LlmResponse, ModelRegistry, ScriptedModel};
use canopy_sessions::{InMemoryArtifactStore, InMemorySessionStore, SessionStore};
use futures::StreamExt;

fn scripted(name: &str, reply: &str) -> Arc<Agent> {
    Agent::llm(name)
        .with_model_instance(Arc::new(ScriptedModel::new(
            "demo-model",
            vec![vec![LlmResponse::text(reply)]],
        )))
        .build()
        .expect("build agent")
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let fan_out = Agent::parallel("researchers")
        .with_children([
            scripted("web_search", "Web search: three relevant articles found."),
            scripted("archive", "Archive: two prior reports match."),
        ])
        .build()
        .expect("build fan-out");

    let root = Agent::sequential("pipeline")
        .with_children([
            fan_out,
            scripted("summarizer", "Summary: five sources total, two key findings."),
        ])
        .build()
        .expect("build pipeline");

    let session_store = Arc::new(InMemorySessionStore::new());
    session_store
        .create_session("demo", "demo_user", None, Some("s1".into()))
        .await
        .expect("create session");

    let runner = Runner::new(
        "demo",
        root,
        session_store,
        Arc::new(InMemoryArtifactStore::new()),
        Arc::new(ModelRegistry::new()),
    );

    let mut events = runner.run(
        "demo_user",
        "s1",
        Content::user_text("What do we know about the topic?"),
        RunConfig::default(),
    );

    while let Some(event) = events.next().await {
        let event = event.expect("event stream errored");
        if let Some(text) = event.content.as_ref().and_then(|c| c.first_text()) {
            println!("[{}] {}", event.branch.as_deref().unwrap_or("-"), text);
        }
    }
}
