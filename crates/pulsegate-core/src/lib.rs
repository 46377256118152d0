//! pulsegate-core — domain types shared across the export pipeline.
//!
//! Defines the metric data model (snapshots, values, summaries), the
//! encoded batch and delivery outcome types exchanged between the
//! queue, worker, and transport, the `SnapshotSource` capability trait,
//! and the pipeline configuration.
//!
//! # Architecture
//!
//! ```text
//! SnapshotSource::capture() → MetricSnapshot
//!   └── encoded → EncodedBatch
//!         └── delivered → DeliveryOutcome
//! ```
//!
//! Everything here is passive data or a capability trait; the moving
//! parts live in `pulsegate-queue` and `pulsegate-pipeline`.

pub mod config;
pub mod source;
pub mod types;

pub use config::{ConfigError, OverflowPolicy, PipelineConfig, SinkConfig, parse_duration};
pub use source::{SnapshotSource, SourceError};
pub use types::{DeliveryOutcome, EncodedBatch, MetricSnapshot, MetricValue, SummaryStats};
