//! Retry budget and backoff computation.

use std::time::Duration;

use rand::Rng;

use pulsegate_core::PipelineConfig;

/// Decides whether a failed batch gets another attempt and how long
/// to wait before it.
///
/// Delays grow as `base · 2^(attempt−1)`, clamped to `cap`, with
/// ±20% jitter so a fleet of exporters recovering from the same sink
/// outage does not retry in lockstep.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base: Duration,
    cap: Duration,
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap,
            max_attempts,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.backoff_base, config.backoff_cap, config.max_attempts)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether a batch that has made `attempts` failed attempts still
    /// has retry budget left.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Jittered delay before retry number `attempt` (1-based: the
    /// delay after the first failure is `attempt == 1`).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let exact = self
            .base
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.cap);
        let factor = rand::thread_rng().gen_range(0.8..=1.2);
        exact.mul_f64(factor)
    }
}
