//! Function-call dispatch — the execute-tools stage of the pipeline.
//!
//! Every function call in a finalized event is resolved against the
//! request's name→tool table and invoked. Failures are caught per call and
//! turned into structured error payloads, so one failing call never aborts
//! its siblings. Long-running tools are flagged rather than awaited; their
//! call ids surface through the event's long-running id set.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use canopy_core::state::State;
use canopy_core::{
    Content, Event, EventActions, FunctionCall, FunctionResponse, Part, Result, ROLE_USER,
};
use canopy_tools::{Tool, ToolContext};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::agent::Agent;
use crate::invocation::InvocationContext;

/// Assign client-side ids to any function call lacking one.
pub(crate) fn populate_function_call_ids(content: &mut Content) {
    for part in &mut content.parts {
        if let Part::FunctionCall(call) = part {
            if call.id.is_none() {
                call.id = Some(format!("call_{}", Uuid::new_v4()));
            }
        }
    }
}

/// Ids of calls whose tools are long-running, per the lookup table.
pub(crate) fn long_running_ids(
    content: &Content,
    tools: &HashMap<String, Arc<dyn Tool>>,
) -> HashSet<String> {
    content
        .function_calls()
        .into_iter()
        .filter(|call| {
            tools
                .get(&call.name)
                .is_some_and(|tool| tool.is_long_running())
        })
        .filter_map(|call| call.id.clone())
        .collect()
}

fn error_response(call: &FunctionCall, message: String) -> Part {
    Part::function_response(FunctionResponse {
        id: call.id.clone(),
        name: call.name.clone(),
        response: serde_json::json!({ "error": message }),
    })
}

/// Execute every function call in `event`; build one function-response
/// event carrying all results and the merged tool actions.
///
/// Returns None when nothing was awaited (e.g. every call was
/// long-running).
pub(crate) async fn handle_function_calls(
    agent: &Arc<Agent>,
    ctx: &InvocationContext,
    event: &Event,
    tools: &HashMap<String, Arc<dyn Tool>>,
) -> Result<Option<Event>> {
    let (app_name, user_id, session_id, state) = {
        let session = ctx.session.read().await;
        (
            session.app_name.clone(),
            session.user_id.clone(),
            session.id.clone(),
            session.state.clone(),
        )
    };

    let mut parts = Vec::new();
    let mut merged_actions = EventActions::default();

    for call in event.function_calls() {
        let Some(tool) = tools.get(&call.name) else {
            warn!(tool = %call.name, "Function call for unknown tool");
            parts.push(error_response(call, format!("Tool not found: {}", call.name)));
            continue;
        };

        if tool.is_long_running() {
            // Flagged on the event's long-running id set; correlated
            // out-of-band instead of being awaited here.
            continue;
        }

        let mut tool_ctx = ToolContext::new(
            &app_name,
            &user_id,
            &session_id,
            &ctx.invocation_id,
            agent.name(),
            call.id.clone(),
            State::new(state.clone(), serde_json::Map::new()),
            Arc::clone(&ctx.artifact_store),
        );

        let started = std::time::Instant::now();
        match tool.run(call.args.clone(), &mut tool_ctx).await {
            Ok(value) => {
                debug!(
                    tool = %call.name,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Tool executed"
                );
                parts.push(Part::function_response(FunctionResponse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    response: value,
                }));
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                parts.push(error_response(call, e.to_string()));
            }
        }
        merged_actions.merge(tool_ctx.into_actions());
    }

    if parts.is_empty() {
        return Ok(None);
    }

    Ok(Some(
        Event::new(&ctx.invocation_id, agent.name())
            .with_branch(ctx.branch.clone())
            .with_content(Content::new(ROLE_USER, parts))
            .with_actions(merged_actions),
    ))
}
