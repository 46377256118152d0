//! The exporter worker.
//!
//! Single consumer of the delivery queue. Each batch walks the state
//! machine `Pending → Attempting → {Delivered | Retrying → Attempting
//! | Dropped}`; retries back off exponentially and a retried batch is
//! finished before anything enqueued after it. All waiting happens on
//! this task — the producer side never blocks on delivery.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use pulsegate_core::types::{DeliveryOutcome, EncodedBatch};
use pulsegate_queue::DeliveryQueue;
use pulsegate_transport::SinkTransport;

use crate::retry::RetryPolicy;
use crate::stats::PipelineStats;

pub struct ExportWorker {
    queue: Arc<DeliveryQueue>,
    transport: Arc<dyn SinkTransport>,
    policy: RetryPolicy,
    stats: Arc<PipelineStats>,
    dequeue_timeout: Duration,
}

impl ExportWorker {
    pub fn new(
        queue: Arc<DeliveryQueue>,
        transport: Arc<dyn SinkTransport>,
        policy: RetryPolicy,
        stats: Arc<PipelineStats>,
        dequeue_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            transport,
            policy,
            stats,
            dequeue_timeout,
        }
    }

    /// Run until shutdown. After the signal, remaining batches get
    /// one final attempt each (no backoff) while the queue drains.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(max_attempts = self.policy.max_attempts(), "exporter worker started");
        loop {
            match self.queue.dequeue(self.dequeue_timeout).await {
                Some(batch) => self.deliver_batch(batch, &mut shutdown).await,
                None => {
                    // Timeout while running, or closed-and-drained
                    // during shutdown.
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("exporter worker stopped");
    }

    /// Drive one batch to a terminal state.
    async fn deliver_batch(&self, mut batch: EncodedBatch, shutdown: &mut watch::Receiver<bool>) {
        let mut failures: Vec<String> = Vec::new();
        loop {
            batch.attempts += 1;
            debug!(
                sequence = batch.sequence,
                attempt = batch.attempts,
                "delivery attempt started"
            );
            let started = Instant::now();
            match self.transport.deliver(&batch).await {
                DeliveryOutcome::Success => {
                    info!(
                        sequence = batch.sequence,
                        attempts = batch.attempts,
                        latency_ms = started.elapsed().as_millis() as u64,
                        "batch delivered"
                    );
                    self.stats.batch_delivered();
                    return;
                }
                DeliveryOutcome::Retryable(reason) => {
                    failures.push(reason.clone());
                    if !self.policy.should_retry(batch.attempts) {
                        warn!(
                            sequence = batch.sequence,
                            attempts = batch.attempts,
                            history = ?failures,
                            "batch dropped, retry budget exhausted"
                        );
                        self.stats.batch_exhausted();
                        return;
                    }
                    // During shutdown drain there is no time to back
                    // off; the batch had its final attempt.
                    if *shutdown.borrow() {
                        warn!(sequence = batch.sequence, "batch dropped on shutdown");
                        self.stats.batch_shutdown_dropped();
                        return;
                    }
                    let delay = self.policy.backoff(batch.attempts);
                    debug!(
                        sequence = batch.sequence,
                        attempt = batch.attempts,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "retry scheduled"
                    );
                    self.stats.retry_scheduled();
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => {
                            warn!(
                                sequence = batch.sequence,
                                "batch dropped on shutdown during backoff"
                            );
                            self.stats.batch_shutdown_dropped();
                            return;
                        }
                    }
                }
                DeliveryOutcome::Fatal(reason) => {
                    warn!(
                        sequence = batch.sequence,
                        attempt = batch.attempts,
                        reason = %reason,
                        "batch dropped, sink rejected it"
                    );
                    self.stats.batch_fatal();
                    return;
                }
            }
        }
    }
}
