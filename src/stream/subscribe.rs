//! Subscriber side of the stream protocol.
//!
//! Every subscription opens with a snapshot of the content produced so
//! far, then relays chunks above the subscriber's cursor until the
//! terminal event. Channel reads are bounded by a timeout: a timeout is a
//! liveness re-check against task state, never a caller-visible error,
//! so no subscriber can hang forever.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::sync::broadcast::error::RecvError;

use super::{StreamEvent, TaskHandle};

/// Where a subscription reads from.
pub enum StreamSource {
    /// A live task in the registry.
    Live {
        task: Arc<TaskHandle>,
        last_seq: u64,
    },
    /// Durable content of an already-evicted task. The registry record is
    /// gone, so the stored text is replayed as a snapshot with an
    /// immediate terminal event.
    Durable { content: String, last_seq: u64 },
}

/// Produce the event stream for one subscriber.
///
/// `last_seq` is the highest sequence number the caller has already
/// rendered; nothing at or below it is re-delivered. Each subscriber gets
/// its own receiver and cursor, so concurrent subscriptions to one task
/// are independent.
pub fn stream_events(
    source: StreamSource,
    read_timeout: Duration,
) -> impl Stream<Item = StreamEvent> {
    async_stream::stream! {
        let (task, last_seq) = match source {
            StreamSource::Durable { content, last_seq } => {
                yield StreamEvent::Snapshot { content, last_seq };
                yield StreamEvent::Done {
                    final_seq: last_seq,
                    cancelled: false,
                };
                return;
            }
            StreamSource::Live { task, last_seq } => (task, last_seq),
        };

        // Subscribe before snapshotting: anything published in between is
        // both covered by the snapshot and queued on the receiver, and the
        // cursor filters the duplicates out.
        let mut rx = task.subscribe();
        let snapshot = task.snapshot();
        let mut cursor = last_seq.max(snapshot.last_seq);
        yield StreamEvent::Snapshot {
            content: snapshot.content,
            last_seq: snapshot.last_seq,
        };

        loop {
            match tokio::time::timeout(read_timeout, rx.recv()).await {
                Ok(Ok(StreamEvent::Chunk { seq, text })) => {
                    if seq > cursor {
                        cursor = seq;
                        yield StreamEvent::Chunk { seq, text };
                    }
                }
                Ok(Ok(done @ StreamEvent::Done { .. })) => {
                    yield done;
                    break;
                }
                // Snapshots are synthesized per subscriber, never published.
                Ok(Ok(StreamEvent::Snapshot { .. })) => {}
                Ok(Err(RecvError::Lagged(missed))) => {
                    // Overflowed the channel; resynchronize from a fresh
                    // snapshot instead of delivering a gap.
                    tracing::debug!(
                        "Subscriber for {} lagged {} events, resnapshotting",
                        task.response_id,
                        missed
                    );
                    let snapshot = task.snapshot();
                    if snapshot.last_seq > cursor {
                        cursor = snapshot.last_seq;
                        yield StreamEvent::Snapshot {
                            content: snapshot.content,
                            last_seq: snapshot.last_seq,
                        };
                    }
                }
                Ok(Err(RecvError::Closed)) => {
                    let snapshot = task.snapshot();
                    yield StreamEvent::Done {
                        final_seq: snapshot.last_seq,
                        cancelled: snapshot.cancelled,
                    };
                    break;
                }
                Err(_elapsed) => {
                    // Liveness re-check. The terminal event may have been
                    // produced before this subscriber attached, or the
                    // wake-up push may have been missed.
                    let snapshot = task.snapshot();
                    if snapshot.completed {
                        yield StreamEvent::Done {
                            final_seq: snapshot.last_seq,
                            cancelled: snapshot.cancelled,
                        };
                        break;
                    }
                    if task.cancel_requested() {
                        yield StreamEvent::Done {
                            final_seq: snapshot.last_seq,
                            cancelled: true,
                        };
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::TaskRegistry;
    use futures::StreamExt;
    use uuid::Uuid;

    const TIMEOUT: Duration = Duration::from_millis(50);

    async fn collect(source: StreamSource) -> Vec<StreamEvent> {
        stream_events(source, TIMEOUT).collect().await
    }

    fn live(task: &Arc<TaskHandle>, last_seq: u64) -> StreamSource {
        StreamSource::Live {
            task: Arc::clone(task),
            last_seq,
        }
    }

    #[tokio::test]
    async fn resume_skips_already_rendered_chunks() {
        let registry = TaskRegistry::new(64);
        let (task, _) = registry.create_or_attach(Uuid::new_v4(), Uuid::new_v4());

        let seq = task.append_increment("Hel");
        task.publish_chunk(seq, "Hel".to_string());

        // Pull the snapshot first so the subscription is attached before
        // the remaining chunks land.
        let mut events = Box::pin(stream_events(live(&task, 1), TIMEOUT));
        let snapshot = events.next().await.unwrap();
        assert!(matches!(
            snapshot,
            StreamEvent::Snapshot { ref content, last_seq: 1 } if content == "Hel"
        ));

        for text in ["lo", "!"] {
            let seq = task.append_increment(text);
            task.publish_chunk(seq, text.to_string());
        }
        task.finish(false);

        let rest: Vec<StreamEvent> = events.collect().await;
        let delivered: Vec<(u64, String)> = rest
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Chunk { seq, text } => Some((*seq, text.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            delivered,
            vec![(2, "lo".to_string()), (3, "!".to_string())]
        );
        assert!(matches!(
            rest.last().unwrap(),
            StreamEvent::Done {
                final_seq: 3,
                cancelled: false
            }
        ));
    }

    #[tokio::test]
    async fn snapshot_covers_chunks_published_before_attach() {
        let registry = TaskRegistry::new(64);
        let (task, _) = registry.create_or_attach(Uuid::new_v4(), Uuid::new_v4());

        for text in ["Hel", "lo", "!"] {
            let seq = task.append_increment(text);
            task.publish_chunk(seq, text.to_string());
        }
        task.finish(false);

        // Attaching after the fact: everything arrives via the snapshot,
        // no chunk is re-delivered below the snapshot's sequence.
        let events = collect(live(&task, 1)).await;
        assert!(matches!(
            events[0],
            StreamEvent::Snapshot { ref content, last_seq: 3 } if content == "Hello!"
        ));
        assert!(events
            .iter()
            .all(|e| !matches!(e, StreamEvent::Chunk { .. })));
        assert!(matches!(
            events.last().unwrap(),
            StreamEvent::Done {
                final_seq: 3,
                cancelled: false
            }
        ));
    }

    #[tokio::test]
    async fn completed_task_terminates_via_liveness_check() {
        let registry = TaskRegistry::new(64);
        let (task, _) = registry.create_or_attach(Uuid::new_v4(), Uuid::new_v4());
        let seq = task.append_increment("done already");
        task.publish_chunk(seq, "done already".to_string());
        task.finish(false);

        // The terminal event predates the subscription, so the channel
        // never delivers it; the timeout path must synthesize it.
        let events = tokio::time::timeout(Duration::from_secs(1), collect(live(&task, 0)))
            .await
            .expect("subscription must not hang");
        assert!(matches!(
            events.last().unwrap(),
            StreamEvent::Done {
                final_seq: 1,
                cancelled: false
            }
        ));
    }

    #[tokio::test]
    async fn cancel_reaches_every_blocked_subscriber() {
        let registry = Arc::new(TaskRegistry::new(64));
        let response_id = Uuid::new_v4();
        let (task, _) = registry.create_or_attach(response_id, Uuid::new_v4());

        let mut subscribers = Vec::new();
        for _ in 0..3 {
            let mut events = Box::pin(stream_events(live(&task, 0), TIMEOUT));
            // Consume the snapshot so each subscription holds a receiver.
            let first = events.next().await.unwrap();
            assert!(matches!(first, StreamEvent::Snapshot { .. }));
            subscribers.push(events);
        }

        registry.mark_cancelled(response_id).unwrap();

        for subscriber in subscribers {
            let events = tokio::time::timeout(
                Duration::from_millis(200),
                subscriber.collect::<Vec<_>>(),
            )
            .await
            .expect("cancel must wake the subscriber within one timeout window");
            assert!(matches!(
                events.last().unwrap(),
                StreamEvent::Done { cancelled: true, .. }
            ));
        }
    }

    #[tokio::test]
    async fn durable_source_replays_snapshot_then_terminal() {
        let events = collect(StreamSource::Durable {
            content: "stored reply".to_string(),
            last_seq: 4,
        })
        .await;

        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            StreamEvent::Snapshot { ref content, last_seq: 4 } if content == "stored reply"
        ));
        assert!(matches!(
            events[1],
            StreamEvent::Done {
                final_seq: 4,
                cancelled: false
            }
        ));
    }

    #[tokio::test]
    async fn sequences_strictly_increase_per_subscriber() {
        let registry = TaskRegistry::new(64);
        let (task, _) = registry.create_or_attach(Uuid::new_v4(), Uuid::new_v4());

        let mut events = Box::pin(stream_events(live(&task, 0), TIMEOUT));
        let first = events.next().await.unwrap();
        assert!(matches!(first, StreamEvent::Snapshot { .. }));

        for text in ["a", "b", "c", "d"] {
            let seq = task.append_increment(text);
            // Publish twice: duplicates below the cursor must be dropped.
            task.publish_chunk(seq, text.to_string());
            task.publish_chunk(seq, text.to_string());
        }
        task.finish(false);

        let events: Vec<StreamEvent> = events.collect().await;
        let seqs: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Chunk { seq, .. } => Some(*seq),
                _ => None,
            })
            .collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
    }
}
