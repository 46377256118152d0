//! pulsegate-transport — delivery to the remote sink.
//!
//! The pipeline treats the sink as an opaque capability: one
//! [`SinkTransport::deliver`] call per attempt, returning a
//! [`DeliveryOutcome`](pulsegate_core::DeliveryOutcome). Each
//! implementation owns its per-call timeout and classifies its own
//! failures into retryable (transient network conditions) versus
//! fatal (the sink definitively rejected the batch).
//!
//! Provided implementation: [`HttpPushTransport`], pushing batches to
//! a push-gateway style HTTP endpoint.

pub mod http_push;

use async_trait::async_trait;

use pulsegate_core::types::{DeliveryOutcome, EncodedBatch};

pub use http_push::{HttpPushTransport, TransportError};

/// A sink capable of receiving encoded batches.
///
/// Implementations must never panic on delivery failure; every
/// failure mode maps to a [`DeliveryOutcome`] variant.
#[async_trait]
pub trait SinkTransport: Send + Sync {
    async fn deliver(&self, batch: &EncodedBatch) -> DeliveryOutcome;
}
