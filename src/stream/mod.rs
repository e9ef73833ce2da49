//! Streaming generation task manager.
//!
//! Turns one slow, append-only generation process into a resumable,
//! cancellable, multi-subscriber delivery stream. One worker per response
//! identity pulls increments from the backend, persists progress, and
//! publishes sequenced chunks on a per-task broadcast channel; any number
//! of subscribers attach with their own cursors; a cleanup supervisor
//! evicts finished tasks once live subscribers have had a chance to see
//! the terminal event. The durable store remains the source of truth
//! throughout - the registry and channel are a delivery accelerator on
//! top of it.

mod cleanup;
mod registry;
mod subscribe;
mod worker;

pub use cleanup::CleanupSupervisor;
pub use registry::{ActiveTask, TaskHandle, TaskRegistry, TaskSnapshot};
pub use subscribe::{stream_events, StreamSource};
pub use worker::{run_generation, INTERRUPTED_MARKER};

use serde::Serialize;


/// One event observed by a stream subscriber.
///
/// A subscription always opens with a `Snapshot`, carries zero or more
/// `Chunk`s with strictly increasing sequence numbers, and ends with
/// exactly one `Done`. Only `Chunk` and `Done` travel on the broadcast
/// channel; snapshots are synthesized per subscriber.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Full content produced so far, for (re)synchronization.
    Snapshot { content: String, last_seq: u64 },
    /// One text increment.
    Chunk { seq: u64, text: String },
    /// Terminal event; no chunk follows it.
    Done { final_seq: u64, cancelled: bool },
}
