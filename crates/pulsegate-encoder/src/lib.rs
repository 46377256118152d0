//! pulsegate-encoder — snapshot to wire-format encoding.
//!
//! Serializes a [`MetricSnapshot`](pulsegate_core::MetricSnapshot)
//! into the Prometheus text exposition format, producing an
//! [`EncodedBatch`](pulsegate_core::EncodedBatch) ready for the
//! delivery queue.
//!
//! Encoding is a pure function: the same snapshot and sequence number
//! always yield byte-identical output. Metric names are normalized to
//! the exposition charset; if two distinct input names normalize to
//! the same family name, encoding fails rather than silently
//! overwriting one of them.

pub mod exposition;

pub use exposition::{EncodeError, encode};
