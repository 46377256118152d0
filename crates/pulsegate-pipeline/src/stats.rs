//! Pipeline self-observability counters.
//!
//! Every disposition a batch or tick can take is counted here, so the
//! queue's lifecycle invariant (enqueued = delivered + dropped +
//! still-pending) is checkable from the outside. Counters are plain
//! relaxed atomics; readers get a coherent-enough view for
//! monitoring.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use pulsegate_core::source::{SnapshotSource, SourceError};
use pulsegate_core::types::{MetricSnapshot, MetricValue};

/// Counters for everything the pipeline does.
#[derive(Debug, Default)]
pub struct PipelineStats {
    ticks: AtomicU64,
    skipped_ticks: AtomicU64,
    capture_failures: AtomicU64,
    encode_failures: AtomicU64,
    enqueued: AtomicU64,
    overflow_drops: AtomicU64,
    rejected: AtomicU64,
    delivered: AtomicU64,
    retries: AtomicU64,
    exhausted_drops: AtomicU64,
    fatal_drops: AtomicU64,
    shutdown_drops: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub capture_failures: u64,
    pub encode_failures: u64,
    pub enqueued: u64,
    pub overflow_drops: u64,
    pub rejected: u64,
    pub delivered: u64,
    pub retries: u64,
    pub exhausted_drops: u64,
    pub fatal_drops: u64,
    pub shutdown_drops: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            skipped_ticks: self.skipped_ticks.load(Ordering::Relaxed),
            capture_failures: self.capture_failures.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            overflow_drops: self.overflow_drops.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            exhausted_drops: self.exhausted_drops.load(Ordering::Relaxed),
            fatal_drops: self.fatal_drops.load(Ordering::Relaxed),
            shutdown_drops: self.shutdown_drops.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn tick_skipped(&self) {
        self.skipped_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn capture_failed(&self) {
        self.capture_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn encode_failed(&self) {
        self.encode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn batch_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn batch_evicted(&self) {
        self.overflow_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn batch_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn batch_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn retry_scheduled(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn batch_exhausted(&self) {
        self.exhausted_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn batch_fatal(&self) {
        self.fatal_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn batch_shutdown_dropped(&self) {
        self.shutdown_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn batches_abandoned(&self, count: u64) {
        self.shutdown_drops.fetch_add(count, Ordering::Relaxed);
    }
}

/// A [`SnapshotSource`] that exports the pipeline's own counters,
/// letting the pipeline monitor itself through the same path it
/// exports everything else.
pub struct StatsSource {
    stats: Arc<PipelineStats>,
}

impl StatsSource {
    pub fn new(stats: Arc<PipelineStats>) -> Self {
        Self { stats }
    }
}

#[async_trait]
impl SnapshotSource for StatsSource {
    async fn capture(&self) -> Result<MetricSnapshot, SourceError> {
        let s = self.stats.snapshot();
        let mut values = BTreeMap::new();
        for (name, value) in [
            ("pulsegate.ticks", s.ticks),
            ("pulsegate.ticks.skipped", s.skipped_ticks),
            ("pulsegate.capture.failures", s.capture_failures),
            ("pulsegate.encode.failures", s.encode_failures),
            ("pulsegate.batches.enqueued", s.enqueued),
            ("pulsegate.batches.overflow_dropped", s.overflow_drops),
            ("pulsegate.batches.rejected", s.rejected),
            ("pulsegate.batches.delivered", s.delivered),
            ("pulsegate.delivery.retries", s.retries),
            ("pulsegate.batches.exhausted", s.exhausted_drops),
            ("pulsegate.batches.fatal", s.fatal_drops),
            ("pulsegate.batches.shutdown_dropped", s.shutdown_drops),
        ] {
            values.insert(name.to_string(), MetricValue::Counter(value));
        }
        Ok(MetricSnapshot::now(values))
    }
}
