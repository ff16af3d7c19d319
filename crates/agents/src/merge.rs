//! Merge scheduler — fan-in of N concurrently running event streams.
//!
//! One spawned task and one capacity-1 channel per stream keeps exactly one
//! outstanding pull per still-active stream; whichever pull resolves first
//! is yielded immediately and only that stream is re-armed. Cross-stream
//! order is completion order; within one stream, original order is
//! preserved. The merge terminates when every stream is exhausted.

use async_stream::stream;
use canopy_core::{Event, Result};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::StreamMap;
use tokio_stream::wrappers::ReceiverStream;

use crate::EventStream;

/// Interleave N event streams in completion order.
pub fn merge(streams: Vec<EventStream>) -> EventStream {
    Box::pin(stream! {
        let mut active: StreamMap<usize, ReceiverStream<Result<Event>>> = StreamMap::new();

        for (index, mut source) in streams.into_iter().enumerate() {
            // Capacity 1: the producer task holds at most one resolved pull
            // until the scheduler consumes it, then re-arms that stream.
            let (tx, rx) = mpsc::channel::<Result<Event>>(1);
            tokio::spawn(async move {
                while let Some(item) = source.next().await {
                    if tx.send(item).await.is_err() {
                        // Scheduler dropped; stop pulling.
                        return;
                    }
                }
            });
            active.insert(index, ReceiverStream::new(rx));
        }

        while let Some((_stream_key, item)) = active.next().await {
            let failed = item.is_err();
            yield item;
            if failed {
                // A child error propagates and ends the merge.
                return;
            }
        }
    })
}
