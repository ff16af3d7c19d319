//! Agent node — the composable execution unit.
//!
//! One `Agent` struct carries the shared entry/exit protocol; the
//! variant-specific body (Llm, Sequential, Parallel, Loop, Remote) is
//! selected by the `AgentKind` tag. Every node exposes a lazy, pull-based,
//! single-pass event stream: nothing runs until the stream is first polled.

use std::sync::{Arc, OnceLock, Weak};

use async_stream::try_stream;
use canopy_core::state::State;
use canopy_core::{Error, Event, Result};
use canopy_models::Model;
use canopy_tools::Tool;
use futures::StreamExt;
use regex_lite::Regex;
use tracing::debug;

use crate::callbacks::{
    AfterAgentCallback, AfterModelCallback, BeforeAgentCallback, BeforeModelCallback,
    CallbackContext,
};
use crate::invocation::InvocationContext;
use crate::{EventStream, composite, flow, remote};

/// Reserved name; events authored by the end user use it.
const RESERVED_NAME: &str = "user";

/// How an Llm agent finds its model binding.
#[derive(Clone)]
pub enum ModelRef {
    /// Resolve through the injected registry at first use.
    Named(String),

    /// Use this binding directly.
    Instance(Arc<dyn Model>),
}

/// Configuration for an Llm agent's model-call pipeline.
#[derive(Default)]
pub struct LlmConfig {
    pub model: Option<ModelRef>,
    pub instruction: Option<String>,
    pub tools: Vec<Arc<dyn Tool>>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub before_model: Option<BeforeModelCallback>,
    pub after_model: Option<AfterModelCallback>,
}

/// Configuration for a remote agent node.
pub struct RemoteConfig {
    pub url: String,
    pub(crate) client: reqwest::Client,
}

/// The closed set of agent variants.
pub enum AgentKind {
    Llm(LlmConfig),
    Sequential,
    Parallel,
    Loop { max_iterations: Option<u32> },
    Remote(RemoteConfig),
}

/// A node in the agent tree.
pub struct Agent {
    name: String,
    description: String,
    kind: AgentKind,
    children: Vec<Arc<Agent>>,
    parent: OnceLock<Weak<Agent>>,
    before_agent: Option<BeforeAgentCallback>,
    after_agent: Option<AfterAgentCallback>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.kind {
            AgentKind::Llm(_) => "Llm",
            AgentKind::Sequential => "Sequential",
            AgentKind::Parallel => "Parallel",
            AgentKind::Loop { .. } => "Loop",
            AgentKind::Remote(_) => "Remote",
        };
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("kind", &kind)
            .field("children", &self.children.len())
            .finish()
    }
}

impl Agent {
    /// Start building an Llm agent.
    pub fn llm(name: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(name, BuilderKind::Llm)
    }

    /// Start building a sequential composite.
    pub fn sequential(name: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(name, BuilderKind::Sequential)
    }

    /// Start building a parallel composite.
    pub fn parallel(name: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(name, BuilderKind::Parallel)
    }

    /// Start building a loop composite.
    pub fn loop_agent(name: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(name, BuilderKind::Loop)
    }

    /// Start building a remote delegation node.
    pub fn remote(name: impl Into<String>, url: impl Into<String>) -> AgentBuilder {
        let mut builder = AgentBuilder::new(name, BuilderKind::Remote);
        builder.url = Some(url.into());
        builder
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn children(&self) -> &[Arc<Agent>] {
        &self.children
    }

    pub(crate) fn kind(&self) -> &AgentKind {
        &self.kind
    }

    pub(crate) fn llm_config(&self) -> Option<&LlmConfig> {
        match &self.kind {
            AgentKind::Llm(config) => Some(config),
            _ => None,
        }
    }

    /// This node's parent, if it was attached to one.
    pub fn parent(&self) -> Option<Arc<Agent>> {
        self.parent.get().and_then(Weak::upgrade)
    }

    /// The root of the tree this node belongs to.
    pub fn root_agent(self: &Arc<Self>) -> Arc<Agent> {
        let mut current = Arc::clone(self);
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Find an agent by name in this subtree (depth-first).
    pub fn find_agent(self: &Arc<Self>, name: &str) -> Option<Arc<Agent>> {
        if self.name == name {
            return Some(Arc::clone(self));
        }
        self.children
            .iter()
            .find_map(|child| child.find_agent(name))
    }

    /// The model reference effective for this node, inherited from the
    /// nearest Llm ancestor when unset locally.
    pub(crate) fn effective_model(self: &Arc<Self>) -> Option<ModelRef> {
        if let AgentKind::Llm(config) = &self.kind {
            if let Some(model) = &config.model {
                return Some(model.clone());
            }
        }
        self.parent().and_then(|parent| parent.effective_model())
    }

    /// Drive this agent for one invocation.
    ///
    /// Entry sequence: derive a child context (append own name to the
    /// branch) → before-hook (may short-circuit and end the invocation) →
    /// variant body → after-hook (may append a trailing event).
    pub fn run(self: &Arc<Self>, parent_ctx: InvocationContext) -> EventStream {
        let agent = Arc::clone(self);
        Box::pin(try_stream! {
            let ctx = parent_ctx.derive(Arc::clone(&agent));
            debug!(agent = %agent.name, branch = ?ctx.branch, "Entering agent");

            if let Some(callback) = &agent.before_agent {
                let state = ctx.session.read().await.state.clone();
                let mut cb_ctx = CallbackContext::new(
                    &agent.name,
                    &ctx.invocation_id,
                    State::new(state, serde_json::Map::new()),
                );
                let content = callback(&mut cb_ctx);
                if let Some(content) = content {
                    ctx.end_invocation();
                    yield Event::new(&ctx.invocation_id, &agent.name)
                        .with_branch(ctx.branch.clone())
                        .with_content(content)
                        .with_actions(cb_ctx.into_actions());
                    return;
                }
                if cb_ctx.has_state_delta() {
                    yield Event::new(&ctx.invocation_id, &agent.name)
                        .with_branch(ctx.branch.clone())
                        .with_actions(cb_ctx.into_actions());
                }
            }
            if ctx.ended() {
                return;
            }

            let mut body = agent.run_body(ctx.clone());
            while let Some(item) = body.next().await {
                let event = item?;
                yield event;
            }

            if let Some(callback) = &agent.after_agent {
                let state = ctx.session.read().await.state.clone();
                let mut cb_ctx = CallbackContext::new(
                    &agent.name,
                    &ctx.invocation_id,
                    State::new(state, serde_json::Map::new()),
                );
                let content = callback(&mut cb_ctx);
                if content.is_some() || cb_ctx.has_state_delta() {
                    let mut event = Event::new(&ctx.invocation_id, &agent.name)
                        .with_branch(ctx.branch.clone())
                        .with_actions(cb_ctx.into_actions());
                    if let Some(content) = content {
                        event = event.with_content(content);
                    }
                    yield event;
                }
            }
        })
    }

    /// Dispatch to the variant-specific body.
    fn run_body(self: &Arc<Self>, ctx: InvocationContext) -> EventStream {
        match &self.kind {
            AgentKind::Llm(_) => flow::run_llm(Arc::clone(self), ctx),
            AgentKind::Sequential => composite::run_sequential(Arc::clone(self), ctx),
            AgentKind::Parallel => composite::run_parallel(Arc::clone(self), ctx),
            AgentKind::Loop { max_iterations } => {
                composite::run_loop(Arc::clone(self), *max_iterations, ctx)
            }
            AgentKind::Remote(_) => remote::run_remote(Arc::clone(self), ctx),
        }
    }
}

/// Validate an agent name: identifier-shaped, not the reserved "user".
pub fn validate_agent_name(name: &str) -> Result<()> {
    static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
    let identifier = IDENTIFIER
        .get_or_init(|| Regex::new("^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex"));

    if !identifier.is_match(name) {
        return Err(Error::config(format!(
            "Invalid agent name '{name}': must be identifier-shaped"
        )));
    }
    if name == RESERVED_NAME {
        return Err(Error::config(format!(
            "Agent name '{RESERVED_NAME}' is reserved"
        )));
    }
    Ok(())
}

enum BuilderKind {
    Llm,
    Sequential,
    Parallel,
    Loop,
    Remote,
}

/// Builder for every agent variant.
pub struct AgentBuilder {
    name: String,
    description: String,
    kind: BuilderKind,
    children: Vec<Arc<Agent>>,
    max_iterations: Option<u32>,
    model: Option<ModelRef>,
    instruction: Option<String>,
    tools: Vec<Arc<dyn Tool>>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    url: Option<String>,
    before_agent: Option<BeforeAgentCallback>,
    after_agent: Option<AfterAgentCallback>,
    before_model: Option<BeforeModelCallback>,
    after_model: Option<AfterModelCallback>,
}

impl AgentBuilder {
    fn new(name: impl Into<String>, kind: BuilderKind) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind,
            children: Vec::new(),
            max_iterations: None,
            model: None,
            instruction: None,
            tools: Vec::new(),
            temperature: None,
            max_tokens: None,
            url: None,
            before_agent: None,
            after_agent: None,
            before_model: None,
            after_model: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Attach a child agent. Children may be parented exactly once.
    pub fn with_child(mut self, child: Arc<Agent>) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Arc<Agent>>) -> Self {
        self.children.extend(children);
        self
    }

    /// Loop only: cap the number of child-sequence repetitions.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = Some(max);
        self
    }

    /// Llm only: resolve the model by name through the registry.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(ModelRef::Named(model.into()));
        self
    }

    /// Llm only: use this model binding directly.
    pub fn with_model_instance(mut self, model: Arc<dyn Model>) -> Self {
        self.model = Some(ModelRef::Instance(model));
        self
    }

    /// Llm only: system instruction for this agent.
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    /// Llm only: attach a tool.
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_before_agent(mut self, callback: BeforeAgentCallback) -> Self {
        self.before_agent = Some(callback);
        self
    }

    pub fn with_after_agent(mut self, callback: AfterAgentCallback) -> Self {
        self.after_agent = Some(callback);
        self
    }

    pub fn with_before_model(mut self, callback: BeforeModelCallback) -> Self {
        self.before_model = Some(callback);
        self
    }

    pub fn with_after_model(mut self, callback: AfterModelCallback) -> Self {
        self.after_model = Some(callback);
        self
    }

    /// Build the node and parent its children.
    ///
    /// Configuration violations (bad name, re-parenting, children on a
    /// remote node, variant-mismatched options) are fatal here.
    pub fn build(self) -> Result<Arc<Agent>> {
        validate_agent_name(&self.name)?;

        let is_llm = matches!(self.kind, BuilderKind::Llm);
        if !is_llm
            && (self.model.is_some()
                || self.instruction.is_some()
                || !self.tools.is_empty()
                || self.before_model.is_some()
                || self.after_model.is_some())
        {
            return Err(Error::config(format!(
                "Agent '{}': model options are only valid on Llm agents",
                self.name
            )));
        }
        if self.max_iterations.is_some() && !matches!(self.kind, BuilderKind::Loop) {
            return Err(Error::config(format!(
                "Agent '{}': max_iterations is only valid on Loop agents",
                self.name
            )));
        }

        let kind = match self.kind {
            BuilderKind::Llm => AgentKind::Llm(LlmConfig {
                model: self.model,
                instruction: self.instruction,
                tools: self.tools,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                before_model: self.before_model,
                after_model: self.after_model,
            }),
            BuilderKind::Sequential => AgentKind::Sequential,
            BuilderKind::Parallel => AgentKind::Parallel,
            BuilderKind::Loop => AgentKind::Loop {
                max_iterations: self.max_iterations,
            },
            BuilderKind::Remote => {
                if !self.children.is_empty() {
                    return Err(Error::config(format!(
                        "Remote agent '{}' cannot have children",
                        self.name
                    )));
                }
                let url = self.url.ok_or_else(|| {
                    Error::config(format!("Remote agent '{}' requires a URL", self.name))
                })?;
                AgentKind::Remote(RemoteConfig {
                    url,
                    client: reqwest::Client::new(),
                })
            }
        };

        let agent = Arc::new(Agent {
            name: self.name,
            description: self.description,
            kind,
            children: self.children,
            parent: OnceLock::new(),
            before_agent: self.before_agent,
            after_agent: self.after_agent,
        });

        for child in &agent.children {
            child
                .parent
                .set(Arc::downgrade(&agent))
                .map_err(|_| {
                    Error::config(format!(
                        "Agent '{}' already has a parent; re-parenting is not allowed",
                        child.name
                    ))
                })?;
        }

        Ok(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation() {
        assert!(validate_agent_name("helper").is_ok());
        assert!(validate_agent_name("helper_2").is_ok());
        assert!(validate_agent_name("_private").is_ok());

        assert!(validate_agent_name("user").is_err());
        assert!(validate_agent_name("2fast").is_err());
        assert!(validate_agent_name("has space").is_err());
        assert!(validate_agent_name("has.dot").is_err());
        assert!(validate_agent_name("").is_err());
    }

    #[test]
    fn reparenting_is_fatal() {
        let child = Agent::sequential("child").build().unwrap();
        let _first = Agent::sequential("first")
            .with_child(Arc::clone(&child))
            .build()
            .unwrap();

        let err = Agent::sequential("second")
            .with_child(child)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn remote_agent_rejects_children() {
        let child = Agent::sequential("child").build().unwrap();
        let err = Agent::remote("edge", "http://localhost:8080/run")
            .with_child(child)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn model_options_rejected_on_composites() {
        let err = Agent::sequential("pipeline")
            .with_instruction("not valid here")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn find_agent_searches_subtree() {
        let leaf = Agent::sequential("leaf").build().unwrap();
        let mid = Agent::sequential("mid")
            .with_child(Arc::clone(&leaf))
            .build()
            .unwrap();
        let root = Agent::sequential("root")
            .with_child(Arc::clone(&mid))
            .build()
            .unwrap();

        assert!(root.find_agent("leaf").is_some());
        assert!(root.find_agent("mid").is_some());
        assert!(root.find_agent("missing").is_none());
        assert_eq!(leaf.root_agent().name(), "root");
    }

    #[test]
    fn effective_model_inherits_from_ancestors() {
        let child = Agent::llm("child").build().unwrap();
        let _root = Agent::llm("root")
            .with_model("gemini-2.0-flash")
            .with_child(Arc::clone(&child))
            .build()
            .unwrap();

        let model = child.effective_model();
        assert!(matches!(model, Some(ModelRef::Named(name)) if name == "gemini-2.0-flash"));
    }
}
