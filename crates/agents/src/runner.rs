//! Runner — the caller that drives a root agent for one user turn.
//!
//! The runner owns the only committed-state write path: it appends the
//! inbound user event, then appends every non-partial event the agent tree
//! yields, in arrival order, before handing each to its caller.

use std::sync::Arc;

use async_stream::try_stream;
use canopy_core::{Content, Event, RunConfig, SessionError, StreamingMode, USER_AUTHOR};
use canopy_models::ModelRegistry;
use canopy_sessions::{ArtifactStore, SessionStore};
use futures::StreamExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::EventStream;
use crate::agent::Agent;
use crate::invocation::InvocationContext;
use crate::live_queue::LiveRequestQueue;

/// Drives one agent tree against one session store.
pub struct Runner {
    app_name: String,
    root_agent: Arc<Agent>,
    session_store: Arc<dyn SessionStore>,
    artifact_store: Arc<dyn ArtifactStore>,
    model_registry: Arc<ModelRegistry>,
}

impl Runner {
    pub fn new(
        app_name: impl Into<String>,
        root_agent: Arc<Agent>,
        session_store: Arc<dyn SessionStore>,
        artifact_store: Arc<dyn ArtifactStore>,
        model_registry: Arc<ModelRegistry>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            root_agent,
            session_store,
            artifact_store,
            model_registry,
        }
    }

    pub fn root_agent(&self) -> &Arc<Agent> {
        &self.root_agent
    }

    /// Run one user turn; the returned stream yields the tree's events.
    pub fn run(
        &self,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        new_message: Content,
        run_config: RunConfig,
    ) -> EventStream {
        let app_name = self.app_name.clone();
        let user_id = user_id.into();
        let session_id = session_id.into();
        let root = Arc::clone(&self.root_agent);
        let session_store = Arc::clone(&self.session_store);
        let artifact_store = Arc::clone(&self.artifact_store);
        let model_registry = Arc::clone(&self.model_registry);

        Box::pin(try_stream! {
            let mut session = session_store
                .get_session(&app_name, &user_id, &session_id, None)
                .await?
                .ok_or_else(|| SessionError::NotFound(session_id.clone()))?;

            let invocation_id = format!("inv_{}", Uuid::new_v4());
            info!(app = %app_name, session = %session_id, invocation = %invocation_id, "Starting invocation");

            let user_event = Event::new(&invocation_id, USER_AUTHOR)
                .with_content(new_message.clone());
            session_store.append_event(&mut session, user_event).await?;

            let ctx = InvocationContext::new(
                Arc::clone(&root),
                invocation_id,
                Some(new_message),
                run_config,
                session,
                Arc::clone(&session_store),
                artifact_store,
                model_registry,
            );

            let mut stream = root.run(ctx.clone());
            while let Some(item) = stream.next().await {
                let event = item?;
                if !event.partial {
                    let mut session = ctx.session.write().await;
                    session_store.append_event(&mut session, event.clone()).await?;
                    debug!(author = %event.author, "Committed event");
                }
                yield event;
            }
        })
    }

    /// Run in live (bidirectional) mode, driven by a request queue.
    pub fn run_live(
        &self,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        queue: LiveRequestQueue,
        mut run_config: RunConfig,
    ) -> EventStream {
        run_config.streaming_mode = StreamingMode::Bidi;

        let app_name = self.app_name.clone();
        let user_id = user_id.into();
        let session_id = session_id.into();
        let root = Arc::clone(&self.root_agent);
        let session_store = Arc::clone(&self.session_store);
        let artifact_store = Arc::clone(&self.artifact_store);
        let model_registry = Arc::clone(&self.model_registry);

        Box::pin(try_stream! {
            let session = session_store
                .get_session(&app_name, &user_id, &session_id, None)
                .await?
                .ok_or_else(|| SessionError::NotFound(session_id.clone()))?;

            let invocation_id = format!("inv_{}", Uuid::new_v4());
            info!(app = %app_name, session = %session_id, invocation = %invocation_id, "Starting live invocation");

            let ctx = InvocationContext::new(
                Arc::clone(&root),
                invocation_id,
                None,
                run_config,
                session,
                Arc::clone(&session_store),
                artifact_store,
                model_registry,
            )
            .with_live_queue(queue);

            let mut stream = root.run(ctx.clone());
            while let Some(item) = stream.next().await {
                let event = item?;
                if !event.partial {
                    let mut session = ctx.session.write().await;
                    session_store.append_event(&mut session, event.clone()).await?;
                }
                yield event;
            }
        })
    }
}
