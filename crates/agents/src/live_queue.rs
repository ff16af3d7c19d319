//! Inbound request queue for live (bidirectional) mode.
//!
//! The caller pushes turns, realtime binary chunks, and finally a close
//! signal; the live pipeline drains the queue and forwards everything to
//! the model connection.

use std::sync::Arc;

use canopy_core::Content;
use canopy_models::Blob;
use tokio::sync::{Mutex, mpsc};

/// One inbound live request.
#[derive(Debug, Clone, Default)]
pub struct LiveRequest {
    /// A full content turn.
    pub content: Option<Content>,

    /// A realtime binary chunk.
    pub blob: Option<Blob>,

    /// Close the connection. Always the last request.
    pub close: bool,
}

/// A cloneable handle to the live request queue.
///
/// Senders push from anywhere; the pipeline is the single consumer.
#[derive(Clone)]
pub struct LiveRequestQueue {
    tx: mpsc::UnboundedSender<LiveRequest>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<LiveRequest>>>,
}

impl LiveRequestQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Queue a content turn.
    pub fn send_content(&self, content: Content) {
        let _ = self.tx.send(LiveRequest {
            content: Some(content),
            ..Default::default()
        });
    }

    /// Queue a realtime binary chunk.
    pub fn send_realtime(&self, blob: Blob) {
        let _ = self.tx.send(LiveRequest {
            blob: Some(blob),
            ..Default::default()
        });
    }

    /// Queue the close signal.
    pub fn close(&self) {
        let _ = self.tx.send(LiveRequest {
            close: true,
            ..Default::default()
        });
    }

    /// Pull the next request; `None` when every sender is gone.
    pub async fn recv(&self) -> Option<LiveRequest> {
        self.rx.lock().await.recv().await
    }
}

impl Default for LiveRequestQueue {
    fn default() -> Self {
        Self::new()
    }
}
