//! Live (bidirectional) pipeline.
//!
//! Two loops share one invocation context: the send loop drains the
//! inbound request queue and forwards turns and binary chunks to the model
//! connection, using a short bounded wait per pull solely to notice the
//! close signal; the receive loop drains model output chunks and converts
//! them to events. Finalized (non-partial) text from both directions
//! accumulates in the transcription buffer until flushed to the caller.

use std::sync::Arc;
use std::time::Duration;

use async_stream::try_stream;
use canopy_core::{
    Content, Error, Event, EventActions, ModelError, ROLE_MODEL, ROLE_USER,
};
use canopy_models::{Blob, LlmRequest, LlmResponse};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::EventStream;
use crate::agent::Agent;
use crate::invocation::InvocationContext;

/// Queue-drain poll interval; a timeout re-arms the pull, it is not an error.
const QUEUE_POLL: Duration = Duration::from_millis(250);

enum LiveSend {
    Content(Content),
    Blob(Blob),
    Close,
}

pub(crate) fn run_live(agent: Arc<Agent>, ctx: InvocationContext) -> EventStream {
    Box::pin(try_stream! {
        let Some(config) = agent.llm_config() else {
            Err(Error::Internal(format!(
                "live pipeline dispatched for non-Llm agent '{}'",
                agent.name()
            )))?;
            return;
        };
        let Some(queue) = ctx.live_queue.clone() else {
            Err(Error::config(format!(
                "Live mode for agent '{}' requires a request queue",
                agent.name()
            )))?;
            return;
        };

        // ── Preprocess: same request assembly as the step pipeline ──
        let (model, model_name) = super::processors::resolve_model(&agent, &ctx)?;
        let mut request = LlmRequest::default();
        request.model = Some(model_name);
        super::processors::apply_generation_config(config, &ctx, &mut request);
        super::processors::apply_instructions(config, &mut request);
        for tool in &config.tools {
            tool.process_request(&mut request);
        }

        let mut connection = model.connect(request).await?;
        let history = super::processors::session_contents(&agent, &ctx).await;
        if !history.is_empty() {
            connection.send_history(history).await?;
        }
        debug!(agent = agent.name(), "Live connection open");

        let (chunk_tx, mut chunk_rx) =
            mpsc::channel::<std::result::Result<LlmResponse, ModelError>>(16);
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<LiveSend>();

        // Send loop: drain the inbound queue. The bounded wait exists only
        // to notice the close signal promptly; elapsing re-arms the pull.
        let send_queue = queue.clone();
        let send_transcription = ctx.transcription.clone();
        let send_task = tokio::spawn(async move {
            loop {
                match tokio::time::timeout(QUEUE_POLL, send_queue.recv()).await {
                    Err(_elapsed) => continue,
                    Ok(None) => {
                        let _ = cmd_tx.send(LiveSend::Close);
                        return;
                    }
                    Ok(Some(request)) => {
                        if request.close {
                            let _ = cmd_tx.send(LiveSend::Close);
                            return;
                        }
                        if let Some(content) = request.content {
                            if let Some(text) = content.first_text() {
                                send_transcription.push(ROLE_USER, text);
                            }
                            if cmd_tx.send(LiveSend::Content(content)).is_err() {
                                return;
                            }
                        }
                        if let Some(blob) = request.blob {
                            if cmd_tx.send(LiveSend::Blob(blob)).is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        });

        // Connection owner: inbound chunks are drained ahead of outbound
        // commands so a queued close cannot drop model output.
        let owner_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    chunk = connection.receive() => match chunk {
                        Ok(Some(response)) => {
                            if chunk_tx.send(Ok(response)).await.is_err() {
                                return;
                            }
                        }
                        Ok(None) => return, // clean close
                        Err(e) => {
                            let _ = chunk_tx.send(Err(e)).await;
                            return;
                        }
                    },
                    cmd = cmd_rx.recv() => match cmd {
                        Some(LiveSend::Content(content)) => {
                            if let Err(e) = connection.send_content(content).await {
                                let _ = chunk_tx.send(Err(e)).await;
                                return;
                            }
                        }
                        Some(LiveSend::Blob(blob)) => {
                            if let Err(e) = connection.send_realtime(blob).await {
                                let _ = chunk_tx.send(Err(e)).await;
                                return;
                            }
                        }
                        Some(LiveSend::Close) | None => {
                            if let Err(e) = connection.close().await {
                                warn!(error = %e, "Error closing live connection");
                            }
                            return;
                        }
                    },
                }
            }
        });

        // Receive loop: convert model chunks to events.
        while let Some(item) = chunk_rx.recv().await {
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(e) => {
                    send_task.abort();
                    owner_task.abort();
                    Err(e)?;
                    return;
                }
            };

            let mut actions = EventActions::default();
            actions.turn_complete = chunk.turn_complete;

            if let Some(content) = chunk.content.clone() {
                if !chunk.partial {
                    if let Some(text) = content.first_text() {
                        ctx.transcription.push(ROLE_MODEL, text);
                    }
                }
                yield Event::new(&ctx.invocation_id, agent.name())
                    .with_branch(ctx.branch.clone())
                    .with_content(content)
                    .with_partial(chunk.partial)
                    .with_actions(actions);
            } else if chunk.turn_complete {
                // Flush the accumulated transcription to the caller.
                let entries = ctx.transcription.take();
                let mut event = Event::new(&ctx.invocation_id, agent.name())
                    .with_branch(ctx.branch.clone())
                    .with_actions(actions);
                if !entries.is_empty() {
                    let transcript = entries
                        .iter()
                        .map(|entry| format!("{}: {}", entry.role, entry.text))
                        .collect::<Vec<_>>()
                        .join("\n");
                    event = event.with_content(Content::model_text(transcript));
                }
                yield event;
            }
        }

        send_task.abort();
        let _ = owner_task.await;
        debug!(agent = agent.name(), "Live connection closed");
    })
}
