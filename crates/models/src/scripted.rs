//! Scripted model — a mock binding that replays queued responses.
//!
//! Each call to `generate` pops the next scripted chunk sequence.
//! Panics if more calls are made than scripts provided.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use canopy_core::{Content, ModelError};
use futures::stream;

use crate::model::{Blob, Model, ModelConnection, ResponseStream};
use crate::request::LlmRequest;
use crate::response::LlmResponse;

/// A mock model that returns scripted response streams.
#[derive(Debug)]
pub struct ScriptedModel {
    name: String,
    scripts: Mutex<VecDeque<Vec<LlmResponse>>>,
    requests: Mutex<Vec<LlmRequest>>,
    live_incoming: Mutex<VecDeque<LlmResponse>>,
    live_sent: Arc<Mutex<Vec<Content>>>,
}

impl ScriptedModel {
    /// Create a scripted model. Each inner Vec is one call's chunk stream.
    pub fn new(name: impl Into<String>, scripts: Vec<Vec<LlmResponse>>) -> Self {
        Self {
            name: name.into(),
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
            live_incoming: Mutex::new(VecDeque::new()),
            live_sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A model that answers every call with a single finalized text chunk.
    pub fn single_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, vec![vec![LlmResponse::text(text)]])
    }

    /// Queue chunks for a live connection opened via `connect`.
    pub fn with_live_incoming(self, incoming: Vec<LlmResponse>) -> Self {
        *self.live_incoming.lock().unwrap() = incoming.into();
        self
    }

    /// Requests recorded so far, in call order.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of `generate` calls made.
    pub fn calls_made(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Contents sent over the live connection, in send order.
    pub fn live_sent(&self) -> Vec<Content> {
        self.live_sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Model for ScriptedModel {
    fn model_name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        request: LlmRequest,
        _stream: bool,
    ) -> std::result::Result<ResponseStream, ModelError> {
        let call_index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };

        let script = self.scripts.lock().unwrap().pop_front().unwrap_or_else(|| {
            panic!("ScriptedModel '{}': no script for call #{call_index}", self.name)
        });

        Ok(Box::pin(stream::iter(script.into_iter().map(Ok))))
    }

    async fn connect(
        &self,
        _request: LlmRequest,
    ) -> std::result::Result<Box<dyn ModelConnection>, ModelError> {
        Ok(Box::new(ScriptedConnection {
            incoming: std::mem::take(&mut *self.live_incoming.lock().unwrap()),
            sent: Arc::clone(&self.live_sent),
            closed: false,
        }))
    }
}

/// A scripted live connection; records sends, replays queued chunks.
pub struct ScriptedConnection {
    incoming: VecDeque<LlmResponse>,
    sent: Arc<Mutex<Vec<Content>>>,
    closed: bool,
}

#[async_trait]
impl ModelConnection for ScriptedConnection {
    async fn send_history(
        &mut self,
        history: Vec<Content>,
    ) -> std::result::Result<(), ModelError> {
        self.sent.lock().unwrap().extend(history);
        Ok(())
    }

    async fn send_content(&mut self, content: Content) -> std::result::Result<(), ModelError> {
        self.sent.lock().unwrap().push(content);
        Ok(())
    }

    async fn send_realtime(&mut self, _blob: Blob) -> std::result::Result<(), ModelError> {
        Ok(())
    }

    async fn receive(&mut self) -> std::result::Result<Option<LlmResponse>, ModelError> {
        if let Some(chunk) = self.incoming.pop_front() {
            return Ok(Some(chunk));
        }
        if self.closed {
            return Ok(None);
        }
        // Open with nothing queued: block until the connection is closed,
        // like a real connection awaiting the next server chunk.
        std::future::pending().await
    }

    async fn close(&mut self) -> std::result::Result<(), ModelError> {
        self.closed = true;
        Ok(())
    }
}
