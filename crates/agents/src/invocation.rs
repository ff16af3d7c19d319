//! Invocation context — the per-run bag propagated down the agent tree.
//!
//! One context is created per invocation and re-derived (new agent, new
//! branch, same backing services) each time control enters a child agent.
//! The branch — the dot-joined lineage of agent names — uniquely identifies
//! which composite agent path produced an event.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use canopy_core::{Content, Error, Result, RunConfig};
use canopy_models::ModelRegistry;
use canopy_sessions::{ArtifactStore, Session, SessionStore};
use tokio::sync::RwLock;

use crate::agent::Agent;
use crate::live_queue::LiveRequestQueue;

/// One finalized line of live-mode transcription.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionEntry {
    /// "user" or "model".
    pub role: String,
    pub text: String,
}

/// Accumulates finalized text from both directions of a live connection
/// until flushed. Single writer: only the model-call pipeline pushes.
#[derive(Clone, Default)]
pub struct TranscriptionBuffer {
    entries: Arc<Mutex<Vec<TranscriptionEntry>>>,
}

impl TranscriptionBuffer {
    pub fn push(&self, role: impl Into<String>, text: impl Into<String>) {
        self.entries.lock().unwrap().push(TranscriptionEntry {
            role: role.into(),
            text: text.into(),
        });
    }

    /// Drain all accumulated entries.
    pub fn take(&self) -> Vec<TranscriptionEntry> {
        std::mem::take(&mut *self.entries.lock().unwrap())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

/// Per-invocation context shared by reference across the agent tree.
#[derive(Clone)]
pub struct InvocationContext {
    /// The agent currently executing.
    pub agent: Arc<Agent>,

    /// Unique id for this invocation.
    pub invocation_id: String,

    /// Dot-joined lineage of agent names.
    pub branch: Option<String>,

    /// The user content that started this invocation.
    pub user_content: Option<Content>,

    /// Run-scoped configuration.
    pub run_config: RunConfig,

    /// The live session; committed only through the append-event path.
    pub session: Arc<RwLock<Session>>,

    /// Backing stores and the injected model registry.
    pub session_store: Arc<dyn SessionStore>,
    pub artifact_store: Arc<dyn ArtifactStore>,
    pub model_registry: Arc<ModelRegistry>,

    /// Inbound queue for live mode.
    pub live_queue: Option<LiveRequestQueue>,

    /// Streaming tools currently active in this invocation, by name.
    pub active_streaming_tools: Arc<Mutex<HashMap<String, LiveRequestQueue>>>,

    /// Live-mode transcription accumulator.
    pub transcription: TranscriptionBuffer,

    end_invocation: Arc<AtomicBool>,
    llm_calls: Arc<AtomicU32>,
}

impl InvocationContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent: Arc<Agent>,
        invocation_id: impl Into<String>,
        user_content: Option<Content>,
        run_config: RunConfig,
        session: Session,
        session_store: Arc<dyn SessionStore>,
        artifact_store: Arc<dyn ArtifactStore>,
        model_registry: Arc<ModelRegistry>,
    ) -> Self {
        Self {
            agent,
            invocation_id: invocation_id.into(),
            branch: None,
            user_content,
            run_config,
            session: Arc::new(RwLock::new(session)),
            session_store,
            artifact_store,
            model_registry,
            live_queue: None,
            active_streaming_tools: Arc::new(Mutex::new(HashMap::new())),
            transcription: TranscriptionBuffer::default(),
            end_invocation: Arc::new(AtomicBool::new(false)),
            llm_calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Attach a live request queue (bidirectional mode).
    pub fn with_live_queue(mut self, queue: LiveRequestQueue) -> Self {
        self.live_queue = Some(queue);
        self
    }

    /// Shallow-derive a child context: new agent, extended branch, same
    /// backing services.
    pub fn derive(&self, agent: Arc<Agent>) -> Self {
        let mut child = self.clone();
        child.branch = Some(match &self.branch {
            Some(branch) => format!("{branch}.{}", agent.name()),
            None => agent.name().to_string(),
        });
        child.agent = agent;
        child
    }

    /// Signal cooperative cancellation, observed at the next yield point.
    pub fn end_invocation(&self) {
        self.end_invocation.store(true, Ordering::SeqCst);
    }

    /// Whether the invocation was ended.
    pub fn ended(&self) -> bool {
        self.end_invocation.load(Ordering::SeqCst)
    }

    /// Count one model call; errors past the configured ceiling.
    pub fn count_llm_call(&self) -> Result<()> {
        let made = self.llm_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if made > self.run_config.max_llm_calls {
            return Err(Error::LlmCallsLimitExceeded {
                limit: self.run_config.max_llm_calls,
            });
        }
        Ok(())
    }
}
