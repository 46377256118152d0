//! pulsegate-pipeline — the export scheduler and delivery pipeline.
//!
//! Assembles the moving parts of the exporter: a scheduler that
//! captures and encodes snapshots on a fixed period, the bounded
//! delivery queue, and a worker that delivers batches to the sink
//! with retry/backoff.
//!
//! # Architecture
//!
//! ```text
//! Pipeline
//!   ├── scheduler task: tick → capture → encode → enqueue
//!   │     └── missed firings are skipped, never queued twice
//!   ├── DeliveryQueue (bounded, FIFO, overflow policy)
//!   └── worker task: dequeue → deliver → retry with backoff → drop
//!         └── Pending → Attempting → {Delivered | Retrying | Dropped}
//! ```
//!
//! Both tasks watch one shutdown channel; teardown closes the queue,
//! drains what it can within the drain timeout, and accounts for
//! everything abandoned. No failure in here ever propagates to the
//! application under measurement.

pub mod pipeline;
pub mod retry;
pub mod scheduler;
pub mod stats;
pub mod worker;

pub use pipeline::Pipeline;
pub use retry::RetryPolicy;
pub use stats::{PipelineStats, StatsSnapshot, StatsSource};
