//! Model trait — the abstraction over LLM backends.
//!
//! A `Model` knows how to turn an `LlmRequest` into a stream of
//! `LlmResponse` chunks, and may optionally expose a persistent
//! bidirectional connection for live mode. Concrete network bindings live
//! outside the engine; the pipeline only sees these traits.

use std::pin::Pin;

use async_trait::async_trait;
use canopy_core::{Content, ModelError};
use futures::Stream;

use crate::request::LlmRequest;
use crate::response::LlmResponse;

/// A lazy stream of response chunks from one model call.
pub type ResponseStream =
    Pin<Box<dyn Stream<Item = std::result::Result<LlmResponse, ModelError>> + Send>>;

/// A binary payload forwarded over a live connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// The core model binding trait.
#[async_trait]
pub trait Model: Send + Sync + std::fmt::Debug {
    /// The model identifier this binding answers for (e.g. "gemini-2.0-flash").
    fn model_name(&self) -> &str;

    /// Send a request and get a stream of response chunks.
    ///
    /// With `stream = false` the stream carries exactly one finalized chunk;
    /// with `stream = true` it carries partial chunks followed by a
    /// finalized one.
    async fn generate(
        &self,
        request: LlmRequest,
        stream: bool,
    ) -> std::result::Result<ResponseStream, ModelError>;

    /// Open a persistent bidirectional connection.
    ///
    /// Default implementation reports the binding as connectionless.
    async fn connect(
        &self,
        _request: LlmRequest,
    ) -> std::result::Result<Box<dyn ModelConnection>, ModelError> {
        Err(ModelError::NotConfigured(format!(
            "Model '{}' does not support live connections",
            self.model_name()
        )))
    }
}

/// A live bidirectional model connection.
///
/// `receive` is pulled one chunk at a time; `Ok(None)` signals a clean
/// close. Transport failures surface as `ModelError` and end the pipeline.
#[async_trait]
pub trait ModelConnection: Send {
    /// Replay conversation history onto the connection.
    async fn send_history(&mut self, history: Vec<Content>) -> std::result::Result<(), ModelError>;

    /// Send one turn of content.
    async fn send_content(&mut self, content: Content) -> std::result::Result<(), ModelError>;

    /// Forward a realtime binary chunk (audio frames, video, ...).
    async fn send_realtime(&mut self, blob: Blob) -> std::result::Result<(), ModelError>;

    /// Pull the next response chunk; `None` when the connection closed cleanly.
    ///
    /// Must be cancel-safe: the live pipeline races this pull against
    /// outbound sends and drops the unfinished future between rounds.
    async fn receive(&mut self) -> std::result::Result<Option<LlmResponse>, ModelError>;

    /// Close the connection.
    async fn close(&mut self) -> std::result::Result<(), ModelError>;
}
