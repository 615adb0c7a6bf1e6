//! Outbound publish queue
//!
//! Unbounded FIFO handoff between arbitrarily many publishing callers and
//! the single supervisor consumer. One lock and one wakeup primitive guard
//! the whole structure; nothing else in the pipeline is shared.
//!
//! # Ordering
//!
//! Items are delivered FIFO as originally enqueued. A failed delivery is
//! requeued at the *tail*, so items enqueued after a failure may be
//! delivered before the failed item's eventual redelivery. Ordering across
//! failures is therefore relaxed, not strict FIFO.
//!
//! # Backpressure
//!
//! There is none. An unreachable broker causes unbounded queue growth.
//! That trade-off is deliberate: `publish` must never block the caller on
//! network conditions, and the queue is memory-only by contract.

use bytes::Bytes;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

/// A routed, already-serialized envelope awaiting delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    /// Routing scope (broker routing key), e.g. `"all"` or `"node"`.
    pub scope: String,
    /// Canonical wire text of one envelope.
    pub payload: Bytes,
}

impl QueueItem {
    pub fn new(scope: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            scope: scope.into(),
            payload: payload.into(),
        }
    }
}

/// Thread-safe ordered handoff with one consumer and many producers.
#[derive(Debug, Default)]
pub struct PublishQueue {
    items: Mutex<VecDeque<QueueItem>>,
    wakeup: Notify,
}

impl PublishQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item at the tail and wake one waiting consumer.
    ///
    /// Requeueing a failed delivery uses the same operation; the item
    /// re-enters at the tail.
    pub async fn push(&self, item: QueueItem) {
        self.items.lock().await.push_back(item);
        self.wakeup.notify_one();
    }

    /// Block until an item is available or `timeout` elapses.
    ///
    /// Returns `None` on timeout so the consumer can recheck shutdown
    /// state between waits.
    pub async fn pop_wait(&self, timeout: Duration) -> Option<QueueItem> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(item) = self.items.lock().await.pop_front() {
                return Some(item);
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            // A push between the lock release above and this wait leaves a
            // stored permit in the Notify, so the wakeup is not lost.
            if tokio::time::timeout(remaining, self.wakeup.notified())
                .await
                .is_err()
            {
                return None;
            }
        }
    }

    /// Take everything currently queued without waiting. Shutdown path.
    pub async fn drain_all(&self) -> Vec<QueueItem> {
        self.items.lock().await.drain(..).collect()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}
