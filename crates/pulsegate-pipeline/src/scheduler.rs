//! The capture scheduler.
//!
//! Fires a capture → encode → enqueue cycle at a fixed period,
//! anchored to absolute deadlines: a slow cycle delays only itself,
//! and any firings it overran are skipped — never run concurrently,
//! never queued up behind it. Every skip is counted.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use pulsegate_core::PipelineConfig;
use pulsegate_core::source::SnapshotSource;
use pulsegate_core::types::MetricSnapshot;
use pulsegate_queue::{DeliveryQueue, Enqueued};

use crate::stats::PipelineStats;

/// Periodically captures snapshots and feeds the delivery queue.
pub struct Scheduler {
    source: Arc<dyn SnapshotSource>,
    queue: Arc<DeliveryQueue>,
    stats: Arc<PipelineStats>,
    interval: Duration,
    prefix_filter: Option<String>,
    labels: BTreeMap<String, String>,
    sequence: u64,
}

impl Scheduler {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        queue: Arc<DeliveryQueue>,
        stats: Arc<PipelineStats>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            source,
            queue,
            stats,
            interval: config.interval,
            prefix_filter: config.prefix_filter.clone(),
            labels: config.sink.grouping.clone(),
            sequence: 0,
        }
    }

    /// Run the tick loop until the shutdown signal.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.interval.as_millis() as u64, "scheduler started");
        let mut next_fire = Instant::now() + self.interval;

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(next_fire) => {
                    self.stats.tick();
                    self.tick().await;

                    // Re-anchor on the absolute schedule. Firings the
                    // cycle overran are skipped, one count per miss.
                    let now = Instant::now();
                    next_fire += self.interval;
                    while next_fire <= now {
                        next_fire += self.interval;
                        self.stats.tick_skipped();
                        warn!("tick overran the interval, skipping a firing");
                    }
                }
                _ = shutdown.changed() => {
                    info!("scheduler shutting down");
                    break;
                }
            }
        }
    }

    /// One capture → encode → enqueue cycle. Failures are terminal to
    /// this tick only.
    async fn tick(&mut self) {
        let snapshot = match self.source.capture().await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "snapshot capture failed, tick abandoned");
                self.stats.capture_failed();
                return;
            }
        };
        let snapshot = self.apply_filter(snapshot);
        debug!(metrics = snapshot.len(), "snapshot captured");

        let batch = match pulsegate_encoder::encode(&snapshot, self.sequence, &self.labels) {
            Ok(b) => b,
            Err(e) => {
                error!(error = %e, "snapshot failed to encode, tick abandoned");
                self.stats.encode_failed();
                return;
            }
        };
        self.sequence += 1;

        match self.queue.enqueue(batch).await {
            Enqueued::Accepted => {
                self.stats.batch_enqueued();
            }
            Enqueued::Evicted(old) => {
                self.stats.batch_enqueued();
                self.stats.batch_evicted();
                debug!(evicted = old.sequence, "stale batch evicted for a fresh one");
            }
            Enqueued::Rejected(batch) => {
                self.stats.batch_rejected();
                debug!(rejected = batch.sequence, "batch rejected, queue full");
            }
            Enqueued::Closed(_) => {}
        }
    }

    fn apply_filter(&self, mut snapshot: MetricSnapshot) -> MetricSnapshot {
        if let Some(prefix) = &self.prefix_filter {
            snapshot.values.retain(|name, _| name.starts_with(prefix));
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    use pulsegate_core::source::SourceError;
    use pulsegate_core::types::MetricValue;
    use pulsegate_core::OverflowPolicy;

    fn test_config(interval: Duration) -> PipelineConfig {
        PipelineConfig {
            interval,
            ..PipelineConfig::default()
        }
    }

    /// Source returning a fixed pair of metrics, optionally slow,
    /// and asserting captures never overlap.
    struct TestSource {
        delay: Duration,
        in_capture: AtomicBool,
        captures: AtomicU64,
        fail: bool,
        collide: bool,
    }

    impl TestSource {
        fn fast() -> Self {
            Self::with_delay(Duration::ZERO)
        }

        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                in_capture: AtomicBool::new(false),
                captures: AtomicU64::new(0),
                fail: false,
                collide: false,
            }
        }
    }

    #[async_trait]
    impl SnapshotSource for TestSource {
        async fn capture(&self) -> Result<MetricSnapshot, SourceError> {
            assert!(
                !self.in_capture.swap(true, Ordering::SeqCst),
                "capture invoked concurrently"
            );
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.captures.fetch_add(1, Ordering::SeqCst);
            self.in_capture.store(false, Ordering::SeqCst);

            if self.fail {
                return Err(SourceError::Capture("registry unavailable".into()));
            }
            let mut values = BTreeMap::new();
            if self.collide {
                values.insert("a.b".to_string(), MetricValue::Counter(1));
                values.insert("a-b".to_string(), MetricValue::Counter(2));
            } else {
                values.insert("app.requests".to_string(), MetricValue::Counter(5));
                values.insert("sys.load".to_string(), MetricValue::Gauge(0.7));
            }
            Ok(MetricSnapshot::now(values))
        }
    }

    async fn run_for(
        source: Arc<TestSource>,
        config: PipelineConfig,
        duration: Duration,
    ) -> (Arc<DeliveryQueue>, Arc<PipelineStats>) {
        let queue = Arc::new(DeliveryQueue::new(
            config.queue_capacity,
            OverflowPolicy::DropOldest,
        ));
        let stats = Arc::new(PipelineStats::default());
        let scheduler = Scheduler::new(source, queue.clone(), stats.clone(), &config);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(scheduler.run(shutdown_rx));
        tokio::time::sleep(duration).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        (queue, stats)
    }

    #[tokio::test]
    async fn ticks_capture_and_enqueue() {
        let source = Arc::new(TestSource::fast());
        let (queue, stats) = run_for(
            source,
            test_config(Duration::from_millis(10)),
            Duration::from_millis(85),
        )
        .await;

        let s = stats.snapshot();
        assert!(s.ticks >= 3, "expected several ticks, got {}", s.ticks);
        assert_eq!(s.ticks, s.enqueued);

        // Batches carry increasing sequence numbers from zero.
        let first = queue.dequeue(Duration::from_millis(10)).await.unwrap();
        let second = queue.dequeue(Duration::from_millis(10)).await.unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
    }

    #[tokio::test]
    async fn slow_capture_skips_firings_not_queues_them() {
        // Each capture takes ~3 intervals; the scheduler must skip
        // the overrun firings rather than stack them.
        let source = Arc::new(TestSource::with_delay(Duration::from_millis(60)));
        let (_queue, stats) = run_for(
            source.clone(),
            test_config(Duration::from_millis(20)),
            Duration::from_millis(200),
        )
        .await;

        let s = stats.snapshot();
        assert!(s.skipped_ticks >= 1, "expected skips, got {}", s.skipped_ticks);
        // The concurrency assertion inside TestSource::capture makes
        // "never queued twice" a hard failure rather than a statistic.
        assert!(source.captures.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn capture_failure_abandons_tick_and_continues() {
        let mut source = TestSource::fast();
        source.fail = true;
        let (queue, stats) = run_for(
            Arc::new(source),
            test_config(Duration::from_millis(10)),
            Duration::from_millis(60),
        )
        .await;

        let s = stats.snapshot();
        assert!(s.capture_failures >= 2);
        assert_eq!(s.enqueued, 0);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn encode_failure_abandons_tick_and_continues() {
        let mut source = TestSource::fast();
        source.collide = true;
        let (queue, stats) = run_for(
            Arc::new(source),
            test_config(Duration::from_millis(10)),
            Duration::from_millis(60),
        )
        .await;

        let s = stats.snapshot();
        assert!(s.encode_failures >= 2);
        assert_eq!(s.enqueued, 0);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn prefix_filter_limits_exported_metrics() {
        let mut config = test_config(Duration::from_millis(10));
        config.prefix_filter = Some("app.".to_string());
        let (queue, _stats) =
            run_for(Arc::new(TestSource::fast()), config, Duration::from_millis(40)).await;

        let batch = queue.dequeue(Duration::from_millis(10)).await.unwrap();
        let text = std::str::from_utf8(&batch.payload).unwrap();
        assert!(text.contains("app_requests 5"));
        assert!(!text.contains("sys_load"));
    }

    #[tokio::test]
    async fn grouping_labels_reach_the_payload() {
        let mut config = test_config(Duration::from_millis(10));
        config.sink.grouping.insert("instance".to_string(), "web-1".to_string());
        let (queue, _stats) =
            run_for(Arc::new(TestSource::fast()), config, Duration::from_millis(40)).await;

        let batch = queue.dequeue(Duration::from_millis(10)).await.unwrap();
        let text = std::str::from_utf8(&batch.payload).unwrap();
        assert!(text.contains("app_requests{instance=\"web-1\"} 5"));
    }
}
