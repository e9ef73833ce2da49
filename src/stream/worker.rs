//! Generation worker.
//!
//! One worker drives exactly one task from creation to its terminal
//! state. For the life of the task it is the only writer of the task
//! buffer and of the durable content row, so persisted content is always
//! the concatenation of the chunks produced so far.

use std::sync::Arc;

use futures::StreamExt;

use crate::llm::{GenerationBackend, GenerationContext, GenerationOptions};
use crate::store::MessageStore;

use super::TaskHandle;

/// Marker appended to the persisted content of a cancelled reply.
pub const INTERRUPTED_MARKER: &str = "\n\n[generation stopped by user]";

/// Run one generation task to completion.
///
/// Backend errors end the task with whatever partial output exists and
/// never propagate further; persistence errors are logged and skipped,
/// with the in-memory buffer staying authoritative until a later persist
/// succeeds. Cancellation is cooperative: the worker checks the flag once
/// per produced increment and is also woken between increments.
pub async fn run_generation(
    task: Arc<TaskHandle>,
    backend: Arc<dyn GenerationBackend>,
    store: Arc<dyn MessageStore>,
    context: GenerationContext,
    options: GenerationOptions,
) {
    let response_id = task.response_id;
    tracing::debug!("Generation worker started for response {}", response_id);

    let mut increments = match backend.submit(context, options).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!("Backend rejected generation for {}: {}", response_id, e);
            persist(store.as_ref(), &task).await;
            task.finish(false);
            return;
        }
    };

    loop {
        // Racing the next increment against the cancel wake keeps
        // cancellation latency below one increment; dropping the stream
        // on the early exit also tears down the backend request.
        let item = tokio::select! {
            item = increments.next() => item,
            _ = task.cancelled() => {
                finish_cancelled(store.as_ref(), &task).await;
                return;
            }
        };

        match item {
            Some(Ok(text)) => {
                if text.is_empty() {
                    continue;
                }
                let seq = task.append_increment(&text);
                persist(store.as_ref(), &task).await;
                task.publish_chunk(seq, text);

                if task.cancel_requested() {
                    finish_cancelled(store.as_ref(), &task).await;
                    return;
                }
            }
            Some(Err(e)) => {
                // Terminal for the task, not for the process; the partial
                // buffer is kept and the task completes normally.
                tracing::error!("Generation backend failed for {}: {}", response_id, e);
                break;
            }
            None => break,
        }
    }

    persist(store.as_ref(), &task).await;
    let snapshot = task.snapshot();
    task.finish(false);
    tracing::debug!(
        "Generation for {} finished with {} chunks ({} bytes)",
        response_id,
        snapshot.last_seq,
        snapshot.content.len()
    );
}

/// Append the interruption marker, persist, and publish the cancelled
/// terminal event.
async fn finish_cancelled(store: &dyn MessageStore, task: &TaskHandle) {
    task.append_plain(INTERRUPTED_MARKER);
    persist(store, task).await;
    let final_seq = task.snapshot().last_seq;
    task.finish(true);
    tracing::info!(
        "Generation for {} cancelled after {} chunks",
        task.response_id,
        final_seq
    );
}

/// Persist the full buffer. Single attempt; failure is logged and the
/// task continues from the in-memory buffer.
async fn persist(store: &dyn MessageStore, task: &TaskHandle) {
    let content = task.snapshot().content;
    if let Err(e) = store.replace_content(task.response_id, &content).await {
        tracing::warn!("Failed to persist content for {}: {}", task.response_id, e);
    }
}
