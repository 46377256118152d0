//! The snapshot source capability.
//!
//! The pipeline never reaches into a metrics registry on its own; a
//! `SnapshotSource` is injected at construction time so sources can be
//! swapped (application registry, self-stats, test doubles) without
//! touching the scheduler.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::MetricSnapshot;

/// Errors raised by a snapshot source during capture.
///
/// A capture failure is terminal to that tick only: the scheduler logs
/// it and waits for the next tick. It never propagates to the host
/// application.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("capture failed: {0}")]
    Capture(String),

    #[error("source is shut down")]
    Closed,
}

/// Produces an immutable snapshot of all tracked metrics on demand.
///
/// `capture` is invoked once per scheduler tick and must return well
/// within the tick interval; the scheduler bounds it defensively and
/// counts an overrun as a skipped tick.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn capture(&self) -> Result<MetricSnapshot, SourceError>;
}
