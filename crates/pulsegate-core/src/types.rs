//! Domain types for the export pipeline.
//!
//! These types flow between the scheduler, encoder, delivery queue,
//! exporter worker, and sink transport. Snapshots and batches are
//! immutable once constructed; the pipeline moves them by value so
//! ownership transfers are explicit.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Metric name as recorded by the instrumented application.
pub type MetricName = String;

// ── Metric values ─────────────────────────────────────────────────

/// Statistical summary of a sampled distribution (histogram or timer).
///
/// Quantile entries map q ∈ (0, 1) to the observed value at that
/// quantile. Timer durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    /// (quantile, value) pairs, e.g. (0.5, 12.0), (0.99, 48.3).
    pub quantiles: Vec<(f64, f64)>,
}

/// A single metric's value at capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricValue {
    /// Monotonic event count.
    Counter(u64),
    /// Arbitrary scalar reading.
    Gauge(f64),
    /// Sampled distribution summary.
    Histogram(SummaryStats),
    /// Event rate, in events per second.
    Meter { rate: f64 },
    /// Duration distribution plus invocation rate.
    Timer { summary: SummaryStats, rate: f64 },
}

// ── Snapshot ──────────────────────────────────────────────────────

/// Immutable point-in-time capture of all tracked metrics.
///
/// Produced by a [`crate::SnapshotSource`] on each scheduler tick and
/// owned by the pipeline until encoded. The value map is ordered so
/// encoding is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    /// Unix timestamp (seconds) when the snapshot was taken.
    pub captured_at: u64,
    /// Metric name → value, in name order.
    pub values: BTreeMap<MetricName, MetricValue>,
}

impl MetricSnapshot {
    /// Create a snapshot stamped with the current wall-clock time.
    pub fn now(values: BTreeMap<MetricName, MetricValue>) -> Self {
        Self {
            captured_at: epoch_secs(),
            values,
        }
    }

    /// Number of metrics in the snapshot.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ── Encoded batch ─────────────────────────────────────────────────

/// Wire-ready form of a snapshot, queued for delivery.
///
/// Owned exclusively by the delivery queue from enqueue until the
/// worker dequeues it; destroyed on successful delivery or drop.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedBatch {
    /// Monotonic sequence number assigned at encode time.
    pub sequence: u64,
    /// Delivery attempts made so far.
    pub attempts: u32,
    /// Unix timestamp (seconds) when the batch was encoded.
    pub created_at: u64,
    /// Encoded payload.
    pub payload: Bytes,
}

impl EncodedBatch {
    pub fn new(sequence: u64, payload: Bytes) -> Self {
        Self {
            sequence,
            attempts: 0,
            created_at: epoch_secs(),
            payload,
        }
    }
}

// ── Delivery outcome ──────────────────────────────────────────────

/// Result of one delivery attempt against the sink transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The sink accepted the batch.
    Success,
    /// Transient condition (timeout, connect failure, 5xx). Worth
    /// retrying with backoff.
    Retryable(String),
    /// The sink definitively rejected the batch (auth, malformed
    /// payload). Retrying cannot succeed.
    Fatal(String),
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryOutcome::Success)
    }
}

/// Current unix time in whole seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
