//! In-flight generation task registry.
//!
//! Process-wide table mapping a response identity to its task record. The
//! registry is owned by the serving layer and injected where needed; all
//! map mutations go through one lock with O(1) hold time and no I/O under
//! the lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::StreamEvent;

/// Registry of in-flight generation tasks.
pub struct TaskRegistry {
    tasks: Mutex<HashMap<Uuid, Arc<TaskHandle>>>,
    channel_capacity: usize,
}

impl TaskRegistry {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            channel_capacity: channel_capacity.max(16),
        }
    }

    /// Get the task for `response_id`, creating it if absent.
    ///
    /// Returns the task and whether this call created it. Creation is
    /// idempotent: exactly one caller per response identity observes
    /// `true`, and only that caller may start the generation worker.
    pub fn create_or_attach(
        &self,
        response_id: Uuid,
        conversation_id: Uuid,
    ) -> (Arc<TaskHandle>, bool) {
        let mut tasks = self.tasks.lock().expect("registry lock poisoned");
        if let Some(existing) = tasks.get(&response_id) {
            return (Arc::clone(existing), false);
        }
        let task = Arc::new(TaskHandle::new(
            response_id,
            conversation_id,
            self.channel_capacity,
        ));
        tasks.insert(response_id, Arc::clone(&task));
        (task, true)
    }

    /// Look up a task by response identity.
    pub fn get(&self, response_id: Uuid) -> Option<Arc<TaskHandle>> {
        self.tasks
            .lock()
            .expect("registry lock poisoned")
            .get(&response_id)
            .map(Arc::clone)
    }

    /// Set the cancellation flag on a task and wake blocked subscribers.
    ///
    /// Returns the task, or `None` if the response identity is unknown.
    /// The worker is woken through its cancel notifier; the synthetic
    /// terminal event pushed here is a best-effort wake-up so subscribers
    /// do not sit out a full read timeout first.
    pub fn mark_cancelled(&self, response_id: Uuid) -> Option<Arc<TaskHandle>> {
        let task = self.get(response_id)?;
        task.request_cancel();
        Some(task)
    }

    /// The most recently started task of a conversation that has not yet
    /// reached a terminal state. Fallback target for conversation-scoped
    /// cancel requests.
    pub fn latest_active_for_conversation(&self, conversation_id: Uuid) -> Option<Arc<TaskHandle>> {
        self.tasks
            .lock()
            .expect("registry lock poisoned")
            .values()
            .filter(|t| t.conversation_id == conversation_id && !t.snapshot().completed)
            .max_by_key(|t| t.created)
            .map(Arc::clone)
    }

    /// Remove a task record. Safe only after its terminal event.
    pub fn evict(&self, response_id: Uuid) {
        self.tasks
            .lock()
            .expect("registry lock poisoned")
            .remove(&response_id);
    }

    /// Evict every task whose terminal event is older than `grace`.
    /// Returns the evicted identities.
    pub fn sweep_evictable(&self, grace: Duration) -> Vec<Uuid> {
        let mut tasks = self.tasks.lock().expect("registry lock poisoned");
        let expired: Vec<Uuid> = tasks
            .iter()
            .filter(|(_, task)| task.evictable(grace))
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            tasks.remove(id);
        }
        expired
    }

    /// Diagnostic snapshot of all live task records.
    pub fn active_tasks(&self) -> Vec<ActiveTask> {
        let tasks = self.tasks.lock().expect("registry lock poisoned");
        let mut list: Vec<ActiveTask> = tasks.values().map(|t| t.describe()).collect();
        list.sort_by_key(|t| t.started_at);
        list
    }
}

/// One in-flight (or recently finished, not yet evicted) generation task.
pub struct TaskHandle {
    pub response_id: Uuid,
    pub conversation_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Monotonic creation instant, used to order tasks within a
    /// conversation.
    pub(crate) created: Instant,
    events: broadcast::Sender<StreamEvent>,
    state: Mutex<TaskState>,
    cancel_requested: AtomicBool,
    cancel_notify: tokio::sync::Notify,
}

struct TaskState {
    content: String,
    last_seq: u64,
    completed: bool,
    cancelled: bool,
    finished_at: Option<Instant>,
}

/// Point-in-time copy of a task's mutable state.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub content: String,
    pub last_seq: u64,
    pub completed: bool,
    pub cancelled: bool,
}

/// Diagnostic view of one task record.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveTask {
    pub response_id: Uuid,
    pub conversation_id: Uuid,
    pub content_len: usize,
    pub completed: bool,
    pub last_seq: u64,
    pub started_at: DateTime<Utc>,
}

impl TaskHandle {
    fn new(response_id: Uuid, conversation_id: Uuid, channel_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(channel_capacity);
        Self {
            response_id,
            conversation_id,
            started_at: Utc::now(),
            created: Instant::now(),
            events,
            state: Mutex::new(TaskState {
                content: String::new(),
                last_seq: 0,
                completed: false,
                cancelled: false,
                finished_at: None,
            }),
            cancel_requested: AtomicBool::new(false),
            cancel_notify: tokio::sync::Notify::new(),
        }
    }

    /// Open an independent read handle on the task's event channel.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    /// Copy of the current buffer and flags.
    pub fn snapshot(&self) -> TaskSnapshot {
        let state = self.state.lock().expect("task lock poisoned");
        TaskSnapshot {
            content: state.content.clone(),
            last_seq: state.last_seq,
            completed: state.completed,
            cancelled: state.cancelled,
        }
    }

    /// Append one text increment to the buffer and advance the sequence.
    /// Worker-only.
    pub(crate) fn append_increment(&self, text: &str) -> u64 {
        let mut state = self.state.lock().expect("task lock poisoned");
        state.last_seq += 1;
        state.content.push_str(text);
        state.last_seq
    }

    /// Append text to the buffer without advancing the sequence (the
    /// interruption marker). Worker-only.
    pub(crate) fn append_plain(&self, text: &str) {
        let mut state = self.state.lock().expect("task lock poisoned");
        state.content.push_str(text);
    }

    /// Publish one chunk. Never blocks; with no receivers, or for lagged
    /// receivers, delivery is dropped and subscribers resynchronize from
    /// a snapshot.
    pub(crate) fn publish_chunk(&self, seq: u64, text: String) {
        let _ = self.events.send(StreamEvent::Chunk { seq, text });
    }

    /// Move the task to its terminal state and publish the terminal
    /// event. Worker-only; called exactly once per task.
    pub(crate) fn finish(&self, cancelled: bool) {
        let final_seq = {
            let mut state = self.state.lock().expect("task lock poisoned");
            state.completed = true;
            state.cancelled = cancelled;
            state.finished_at = Some(Instant::now());
            state.last_seq
        };
        let _ = self.events.send(StreamEvent::Done {
            final_seq,
            cancelled,
        });
    }

    /// Request cooperative cancellation and push a synthetic terminal
    /// event so blocked subscribers wake immediately.
    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
        self.cancel_notify.notify_one();
        let last_seq = self.state.lock().expect("task lock poisoned").last_seq;
        let _ = self.events.send(StreamEvent::Done {
            final_seq: last_seq,
            cancelled: true,
        });
    }

    /// Whether cancellation has been requested.
    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Resolve once cancellation is requested, so the worker does not
    /// have to wait out the backend's next increment to notice. The
    /// permit is stored: a request issued before this call completes it
    /// immediately.
    pub(crate) async fn cancelled(&self) {
        if self.cancel_requested() {
            return;
        }
        self.cancel_notify.notified().await;
    }

    fn evictable(&self, grace: Duration) -> bool {
        let state = self.state.lock().expect("task lock poisoned");
        state
            .finished_at
            .map(|at| at.elapsed() >= grace)
            .unwrap_or(false)
    }

    fn describe(&self) -> ActiveTask {
        let state = self.state.lock().expect("task lock poisoned");
        ActiveTask {
            response_id: self.response_id,
            conversation_id: self.conversation_id,
            content_len: state.content.len(),
            completed: state.completed,
            last_seq: state.last_seq,
            started_at: self.started_at,
        }
    }
}
