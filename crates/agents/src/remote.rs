//! Remote agent body — delegation over HTTP.
//!
//! Wire contract: POST `{invocationId, session}` as JSON to the configured
//! URL; the response must be a JSON array of event-shaped objects. Each
//! parsed event's author is overwritten with this node's name. Transport
//! failures and non-success statuses abort this node's contribution and
//! propagate to the caller.

use std::sync::Arc;

use async_stream::try_stream;
use canopy_core::{Event, RemoteAgentError};
use serde::Serialize;
use tracing::{debug, warn};

use crate::EventStream;
use crate::agent::{Agent, AgentKind};
use crate::invocation::InvocationContext;

#[derive(Serialize)]
struct RemoteRunPayload<'a> {
    #[serde(rename = "invocationId")]
    invocation_id: &'a str,
    session: &'a canopy_sessions::Session,
}

pub(crate) fn run_remote(agent: Arc<Agent>, ctx: InvocationContext) -> EventStream {
    Box::pin(try_stream! {
        let AgentKind::Remote(config) = agent.kind() else {
            Err(canopy_core::Error::Internal(format!(
                "run_remote dispatched for non-remote agent '{}'",
                agent.name()
            )))?;
            return;
        };

        let session = ctx.session.read().await.clone();
        let payload = RemoteRunPayload {
            invocation_id: &ctx.invocation_id,
            session: &session,
        };

        debug!(agent = agent.name(), url = %config.url, "Delegating to remote agent");
        let response = config
            .client
            .post(&config.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| RemoteAgentError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(agent = agent.name(), status = status.as_u16(), "Remote agent returned failure");
            Err(RemoteAgentError::Status {
                status: status.as_u16(),
                message: body,
            })?;
        } else {
            let events: Vec<Event> = response
                .json()
                .await
                .map_err(|e| RemoteAgentError::InvalidPayload(e.to_string()))?;

            debug!(agent = agent.name(), count = events.len(), "Remote agent returned events");
            for event in events {
                yield event.with_author(agent.name());
            }
        }
    })
}
