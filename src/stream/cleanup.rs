//! Eviction of finished generation tasks.
//!
//! A finished task stays in the registry for a grace window so that
//! subscribers mid-read on its channel can still observe the terminal
//! event directly. After the window the record is evicted and late
//! subscribers fall through to the durable store.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::TaskRegistry;

/// Background sweeper that evicts finished tasks after the grace window.
pub struct CleanupSupervisor {
    registry: Arc<TaskRegistry>,
    grace: Duration,
    interval: Duration,
}

impl CleanupSupervisor {
    pub fn new(registry: Arc<TaskRegistry>, grace: Duration, interval: Duration) -> Self {
        Self {
            registry,
            grace,
            interval,
        }
    }

    /// Start the sweep loop.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(self.interval).await;
                let evicted = self.registry.sweep_evictable(self.grace);
                if !evicted.is_empty() {
                    tracing::debug!("Evicted {} finished tasks: {:?}", evicted.len(), evicted);
                }
            }
        })
    }
}
