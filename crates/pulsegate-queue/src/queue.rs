//! Bounded FIFO queue with overflow policies and timed dequeue.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use pulsegate_core::OverflowPolicy;
use pulsegate_core::types::EncodedBatch;

/// Result of an enqueue attempt.
///
/// Displaced batches are handed back to the caller so their
/// disposition can be counted; nothing is silently lost.
#[derive(Debug, PartialEq)]
pub enum Enqueued {
    /// Admitted within capacity.
    Accepted,
    /// Admitted after evicting the oldest pending batch.
    Evicted(EncodedBatch),
    /// Refused under `RejectNew`; the offered batch is returned.
    Rejected(EncodedBatch),
    /// The queue is closed for shutdown; the offered batch is returned.
    Closed(EncodedBatch),
}

struct Inner {
    buf: VecDeque<EncodedBatch>,
    closed: bool,
}

/// Bounded, ordered buffer of pending batches.
///
/// Invariant: FIFO order is preserved and length never exceeds the
/// configured capacity. One mutex guards the buffer; a [`Notify`]
/// wakes the consumer — there is no other shared state between the
/// producer and consumer sides.
pub struct DeliveryQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
    policy: OverflowPolicy,
}

impl DeliveryQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            inner: Mutex::new(Inner {
                buf: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
            policy,
        }
    }

    /// Offer a batch. Never blocks beyond the internal lock and never
    /// fails; at capacity the overflow policy decides the outcome.
    pub async fn enqueue(&self, batch: EncodedBatch) -> Enqueued {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            debug!(sequence = batch.sequence, "queue closed, batch refused");
            return Enqueued::Closed(batch);
        }

        if inner.buf.len() < self.capacity {
            inner.buf.push_back(batch);
            drop(inner);
            self.notify.notify_one();
            return Enqueued::Accepted;
        }

        match self.policy {
            OverflowPolicy::DropOldest => match inner.buf.pop_front() {
                Some(evicted) => {
                    warn!(
                        evicted = evicted.sequence,
                        admitted = batch.sequence,
                        "queue full, oldest batch evicted"
                    );
                    inner.buf.push_back(batch);
                    drop(inner);
                    self.notify.notify_one();
                    Enqueued::Evicted(evicted)
                }
                // Zero capacity leaves nothing to evict.
                None => Enqueued::Rejected(batch),
            },
            OverflowPolicy::RejectNew => {
                warn!(
                    rejected = batch.sequence,
                    depth = inner.buf.len(),
                    "queue full, new batch rejected"
                );
                Enqueued::Rejected(batch)
            }
        }
    }

    /// Wait up to `timeout` for a batch.
    ///
    /// Returns `None` on timeout, or once the queue is closed and
    /// drained. Pending batches remain dequeuable after close so the
    /// worker can drain them.
    pub async fn dequeue(&self, timeout: Duration) -> Option<EncodedBatch> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register interest before checking, so a notify between
            // the check and the await is not lost.
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().await;
                if let Some(batch) = inner.buf.pop_front() {
                    return Some(batch);
                }
                if inner.closed {
                    return None;
                }
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(deadline) => return None,
            }
        }
    }

    /// Stop accepting batches. Pending ones stay drainable.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        drop(inner);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.buf.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.buf.is_empty()
    }
}
