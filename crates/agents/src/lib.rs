//! # Canopy Agents
//!
//! The orchestration engine: a tree of composable agents (Llm, Sequential,
//! Parallel, Loop, Remote) jointly answers a user turn. Every node exposes
//! a lazy pull-based event stream; composites drive their children through
//! the shared entry protocol, Parallel fans in through the merge scheduler,
//! and Llm nodes run the model-call pipeline (request assembly, streaming,
//! tool dispatch, transfer).

use std::pin::Pin;

use canopy_core::{Event, Result};
use futures::Stream;

pub mod agent;
pub mod callbacks;
mod composite;
mod flow;
pub mod invocation;
pub mod live_queue;
pub mod merge;
mod remote;
pub mod runner;
pub mod testing;

/// A lazy, finite, single-pass sequence of events from one running node.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Event>> + Send>>;

pub use agent::{Agent, AgentBuilder, AgentKind, LlmConfig, ModelRef, RemoteConfig};
pub use callbacks::{
    AfterAgentCallback, AfterModelCallback, BeforeAgentCallback, BeforeModelCallback,
    CallbackContext,
};
pub use invocation::{InvocationContext, TranscriptionBuffer, TranscriptionEntry};
pub use live_queue::{LiveRequest, LiveRequestQueue};
pub use merge::merge;
pub use runner::Runner;
