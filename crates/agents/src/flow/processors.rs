//! Request processors — the ordered preprocess stage of the pipeline.
//!
//! Each processor mutates the outgoing request: resolve the effective
//! model, merge generation config, inject the system instruction, and
//! assemble the branch-compatible message history from the session log.

use std::sync::Arc;

use canopy_core::{Content, Error, ROLE_USER, Result};
use canopy_models::{LlmRequest, Model};

use crate::agent::{Agent, AgentKind, LlmConfig, ModelRef};
use crate::invocation::InvocationContext;

/// Resolve the effective model binding and its request name.
///
/// A missing binding is a configuration error at first use.
pub(crate) fn resolve_model(
    agent: &Arc<Agent>,
    ctx: &InvocationContext,
) -> Result<(Arc<dyn Model>, String)> {
    let model_ref = agent.effective_model().ok_or_else(|| {
        Error::config(format!("Agent '{}' has no model binding", agent.name()))
    })?;
    match model_ref {
        ModelRef::Instance(model) => {
            let name = model.model_name().to_string();
            Ok((model, name))
        }
        ModelRef::Named(name) => {
            let model = ctx.model_registry.resolve(&name)?;
            Ok((model, name))
        }
    }
}

/// Merge the agent's generation settings and run-scoped modalities.
pub(crate) fn apply_generation_config(
    config: &LlmConfig,
    ctx: &InvocationContext,
    request: &mut LlmRequest,
) {
    request.config.temperature = config.temperature;
    request.config.max_tokens = config.max_tokens;
    request.config.response_modalities = ctx.run_config.response_modalities.clone();
}

/// Inject the agent's system instruction.
pub(crate) fn apply_instructions(config: &LlmConfig, request: &mut LlmRequest) {
    if let Some(instruction) = &config.instruction {
        request.append_instructions(&[instruction]);
    }
}

/// Assemble message history from branch-compatible session events.
pub(crate) async fn apply_contents(
    agent: &Arc<Agent>,
    ctx: &InvocationContext,
    request: &mut LlmRequest,
) {
    request.contents = session_contents(agent, ctx).await;
}

/// Branch-compatible history, oldest first. Events authored by this agent
/// become "model" turns; everything else (user, other agents) becomes
/// "user" turns.
pub(crate) async fn session_contents(
    agent: &Arc<Agent>,
    ctx: &InvocationContext,
) -> Vec<Content> {
    let root = ctx.agent.root_agent();
    let session = ctx.session.read().await;

    let mut contents = Vec::new();
    for event in &session.events {
        if event.partial {
            continue;
        }
        let Some(content) = &event.content else {
            continue;
        };
        if !branch_visible(&root, event.branch.as_deref(), ctx.branch.as_deref()) {
            continue;
        }
        // Own events keep their content role (function responses stay
        // "user" turns); everything foreign is presented as a user turn.
        let role = if event.author == agent.name() {
            content.role.as_str()
        } else {
            ROLE_USER
        };
        contents.push(Content::new(role, content.parts.clone()));
    }

    if contents.is_empty() {
        if let Some(user_content) = &ctx.user_content {
            contents.push(user_content.clone());
        }
    }
    contents
}

/// Whether an event produced on `event_branch` is visible from
/// `current_branch`.
///
/// Lineage-related branches (one a prefix of the other) are always
/// visible. Diverging branches are visible unless the divergence point in
/// the agent tree is a Parallel node — concurrent siblings are isolated,
/// sequential siblings share history.
pub(crate) fn branch_visible(
    root: &Arc<Agent>,
    event_branch: Option<&str>,
    current_branch: Option<&str>,
) -> bool {
    let (Some(event_branch), Some(current_branch)) = (event_branch, current_branch) else {
        return true;
    };

    let event_path: Vec<&str> = event_branch.split('.').collect();
    let current_path: Vec<&str> = current_branch.split('.').collect();

    let common = event_path
        .iter()
        .zip(current_path.iter())
        .take_while(|(a, b)| a == b)
        .count();

    if common == event_path.len() || common == current_path.len() {
        // One lineage contains the other.
        return true;
    }
    if common == 0 {
        return true;
    }

    let divergence_parent = event_path[common - 1];
    match root.find_agent(divergence_parent).map(|a| {
        matches!(a.kind(), AgentKind::Parallel)
    }) {
        Some(is_parallel) => !is_parallel,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Arc<Agent> {
        let a = Agent::sequential("worker_a").build().unwrap();
        let b = Agent::sequential("worker_b").build().unwrap();
        let fan_out = Agent::parallel("fan_out")
            .with_children([a, b])
            .build()
            .unwrap();

        let first = Agent::sequential("first").build().unwrap();
        let second = Agent::sequential("second").build().unwrap();
        let pipeline = Agent::sequential("pipeline")
            .with_children([first, second])
            .build()
            .unwrap();

        Agent::sequential("root")
            .with_children([fan_out, pipeline])
            .build()
            .unwrap()
    }

    #[test]
    fn unbranched_events_are_always_visible() {
        let root = tree();
        assert!(branch_visible(&root, None, Some("root.pipeline.first")));
    }

    #[test]
    fn ancestor_events_are_visible() {
        let root = tree();
        assert!(branch_visible(&root, Some("root"), Some("root.pipeline.first")));
        assert!(branch_visible(
            &root,
            Some("root.pipeline"),
            Some("root.pipeline.second")
        ));
    }

    #[test]
    fn sequential_siblings_share_history() {
        let root = tree();
        assert!(branch_visible(
            &root,
            Some("root.pipeline.first"),
            Some("root.pipeline.second")
        ));
    }

    #[test]
    fn parallel_siblings_are_isolated() {
        let root = tree();
        assert!(!branch_visible(
            &root,
            Some("root.fan_out.worker_a"),
            Some("root.fan_out.worker_b")
        ));
    }

    #[test]
    fn descendant_events_are_visible_to_ancestors() {
        let root = tree();
        assert!(branch_visible(
            &root,
            Some("root.pipeline.first"),
            Some("root.pipeline")
        ));
    }
}
