//! pulsegate-queue — the bounded delivery queue.
//!
//! Decouples the capture cadence from network availability: the
//! scheduler enqueues encoded batches, the exporter worker dequeues
//! them. Single producer, single consumer, FIFO.
//!
//! # Architecture
//!
//! ```text
//! Scheduler ──enqueue──▶ DeliveryQueue ──dequeue──▶ Exporter Worker
//!                          │ capacity Q
//!                          └ overflow: drop-oldest | reject-new
//! ```
//!
//! At capacity the configured [`OverflowPolicy`] decides: evict the
//! oldest pending batch (fresher metrics win) or refuse the new one.
//! Either way the producer is never blocked and never sees an error.

pub mod queue;

pub use queue::{DeliveryQueue, Enqueued};
