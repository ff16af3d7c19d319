//! The model-call pipeline driving an Llm agent.
//!
//! One step is PREPROCESS → CALL_MODEL → POSTPROCESS → (function calls
//! present) EXECUTE_TOOLS → (transfer requested) DELEGATE. Steps repeat
//! until the most recently emitted event satisfies `is_final_response()` —
//! that check, not stream exhaustion of a single call, terminates the loop.

pub(crate) mod functions;
pub(crate) mod live;
pub(crate) mod processors;

use std::collections::HashMap;
use std::sync::Arc;

use async_stream::try_stream;
use canopy_core::state::State;
use canopy_core::{Error, Event, EventActions, ModelError, StreamingMode};
use canopy_models::{LlmRequest, LlmResponse};
use canopy_tools::Tool;
use futures::StreamExt;
use futures::stream;
use tracing::{debug, warn};

use crate::EventStream;
use crate::agent::Agent;
use crate::callbacks::CallbackContext;
use crate::invocation::InvocationContext;

/// Run an Llm agent's body: the step loop, or the live pipeline when the
/// run is bidirectional and a request queue is attached.
pub(crate) fn run_llm(agent: Arc<Agent>, ctx: InvocationContext) -> EventStream {
    if ctx.run_config.streaming_mode == StreamingMode::Bidi && ctx.live_queue.is_some() {
        return live::run_live(agent, ctx);
    }

    Box::pin(try_stream! {
        loop {
            let mut last_event: Option<Event> = None;
            let mut step = run_one_step(Arc::clone(&agent), ctx.clone());
            while let Some(item) = step.next().await {
                let event = item?;
                last_event = Some(event.clone());
                yield event;
            }

            match &last_event {
                None => break,
                Some(event) if event.is_final_response() => break,
                _ => {}
            }
            if ctx.ended() {
                break;
            }
        }
    })
}

/// One model call with its surrounding stages.
fn run_one_step(agent: Arc<Agent>, ctx: InvocationContext) -> EventStream {
    Box::pin(try_stream! {
        let Some(config) = agent.llm_config() else {
            Err(Error::Internal(format!(
                "model-call pipeline dispatched for non-Llm agent '{}'",
                agent.name()
            )))?;
            return;
        };

        // ── Preprocess ──
        let (model, model_name) = processors::resolve_model(&agent, &ctx)?;
        let mut request = LlmRequest::default();
        request.model = Some(model_name);
        processors::apply_generation_config(config, &ctx, &mut request);
        processors::apply_instructions(config, &mut request);
        processors::apply_contents(&agent, &ctx, &mut request).await;

        let mut tools: HashMap<String, Arc<dyn Tool>> = HashMap::new();
        for tool in &config.tools {
            tool.process_request(&mut request);
            tools.insert(tool.name().to_string(), Arc::clone(tool));
        }

        // ── Call model ──
        let state_snapshot = ctx.session.read().await.state.clone();
        let mut hook_actions = EventActions::default();

        let canned = config.before_model.as_ref().and_then(|callback| {
            let mut cb_ctx = CallbackContext::new(
                agent.name(),
                &ctx.invocation_id,
                State::new(state_snapshot.clone(), serde_json::Map::new()),
            );
            let response = callback(&mut cb_ctx, &request);
            hook_actions.merge(cb_ctx.into_actions());
            response
        });

        let mut chunks = match canned {
            Some(response) => {
                debug!(agent = agent.name(), "before-model hook returned a canned response");
                Box::pin(stream::iter([Ok::<LlmResponse, ModelError>(response)]))
                    as canopy_models::ResponseStream
            }
            None => {
                ctx.count_llm_call()?;
                debug!(agent = agent.name(), model = request.model.as_deref().unwrap_or(""), "Calling model");
                model
                    .generate(
                        request.clone(),
                        ctx.run_config.streaming_mode == StreamingMode::Sse,
                    )
                    .await?
            }
        };

        let mut final_response: Option<LlmResponse> = None;
        while let Some(item) = chunks.next().await {
            let mut chunk = item?;

            if let Some(callback) = &config.after_model {
                let mut cb_ctx = CallbackContext::new(
                    agent.name(),
                    &ctx.invocation_id,
                    State::new(state_snapshot.clone(), serde_json::Map::new()),
                );
                if let Some(substitute) = callback(&mut cb_ctx, &chunk) {
                    chunk = substitute;
                }
                hook_actions.merge(cb_ctx.into_actions());
            }

            if chunk.is_error() {
                let code = chunk.error_code.clone().unwrap_or_default();
                let message = chunk.error_message.clone().unwrap_or_default();
                warn!(agent = agent.name(), code = %code, "Model reported an error chunk");
                Err(ModelError::StreamInterrupted(format!("{code}: {message}")))?;
            }

            if chunk.partial {
                if let Some(content) = chunk.content.clone() {
                    yield Event::new(&ctx.invocation_id, agent.name())
                        .with_branch(ctx.branch.clone())
                        .with_content(content)
                        .with_partial(true);
                }
            } else {
                final_response = Some(chunk);
            }
        }

        // ── Postprocess ──
        let Some(response) = final_response else {
            return;
        };
        let Some(mut content) = response.content else {
            // Accumulated response has no content: emit nothing.
            return;
        };

        functions::populate_function_call_ids(&mut content);
        let long_running = functions::long_running_ids(&content, &tools);

        let final_event = Event::new(&ctx.invocation_id, agent.name())
            .with_branch(ctx.branch.clone())
            .with_content(content)
            .with_actions(hook_actions)
            .with_long_running_tool_ids(long_running);
        let has_calls = !final_event.function_calls().is_empty();
        yield final_event.clone();

        // ── Execute tools ──
        if has_calls {
            let Some(response_event) =
                functions::handle_function_calls(&agent, &ctx, &final_event, &tools).await?
            else {
                return;
            };
            let transfer = response_event.actions.transfer_to_agent.clone();
            yield response_event;

            // ── Delegate ──
            if let Some(target_name) = transfer {
                let root = agent.root_agent();
                let target = root.find_agent(&target_name).ok_or_else(|| {
                    Error::config(format!(
                        "Transfer target '{target_name}' not found in agent tree"
                    ))
                })?;
                debug!(from = agent.name(), to = %target_name, "Transferring invocation");
                let mut delegated = target.run(ctx.clone());
                while let Some(item) = delegated.next().await {
                    let event = item?;
                    yield event;
                }
            }
        }
    })
}
