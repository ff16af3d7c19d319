//! Variant bodies for the composite agents.
//!
//! Sequential drives each child's stream to exhaustion before the next;
//! Parallel starts all children concurrently and interleaves them through
//! the merge scheduler; Loop repeats the child sequence until the iteration
//! cap or an escalation. Cancellation is cooperative: the end-invocation
//! flag is observed between yields, never mid-pull.

use std::sync::Arc;

use async_stream::try_stream;
use futures::StreamExt;
use tracing::debug;

use crate::EventStream;
use crate::agent::Agent;
use crate::invocation::InvocationContext;
use crate::merge::merge;

/// Drive children one at a time; overall order is the concatenation of the
/// children's own orders.
pub(crate) fn run_sequential(agent: Arc<Agent>, ctx: InvocationContext) -> EventStream {
    Box::pin(try_stream! {
        for child in agent.children() {
            let mut stream = child.run(ctx.clone());
            while let Some(item) = stream.next().await {
                let event = item?;
                yield event;
            }
            if ctx.ended() {
                return;
            }
        }
    })
}

/// Start all children concurrently; each child gets a branch suffix equal
/// to its own name and the merge scheduler interleaves completions.
pub(crate) fn run_parallel(agent: Arc<Agent>, ctx: InvocationContext) -> EventStream {
    let streams: Vec<EventStream> = agent
        .children()
        .iter()
        .map(|child| child.run(ctx.clone()))
        .collect();
    merge(streams)
}

/// Repeat the full child sequence up to `max_iterations` (unbounded when
/// None); stop as soon as any child event escalates, after yielding it.
pub(crate) fn run_loop(
    agent: Arc<Agent>,
    max_iterations: Option<u32>,
    ctx: InvocationContext,
) -> EventStream {
    Box::pin(try_stream! {
        if agent.children().is_empty() {
            return;
        }
        let mut iterations = 0u32;
        'run: loop {
            if let Some(max) = max_iterations {
                if iterations >= max {
                    debug!(agent = agent.name(), iterations, "Loop reached max iterations");
                    break 'run;
                }
            }
            iterations += 1;

            for child in agent.children() {
                let mut stream = child.run(ctx.clone());
                while let Some(item) = stream.next().await {
                    let event = item?;
                    let escalated = event.actions.escalate;
                    yield event;
                    if escalated {
                        debug!(agent = agent.name(), iterations, "Loop stopped by escalation");
                        break 'run;
                    }
                }
                if ctx.ended() {
                    break 'run;
                }
            }
        }
    })
}
