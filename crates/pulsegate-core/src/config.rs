//! Pipeline configuration.
//!
//! Loaded from a `pulsegate.toml` file where every field is optional
//! and falls back to a sane default, so a minimal file (or none at
//! all) yields a working pipeline. Durations are human-readable
//! strings: `"60s"`, `"500ms"`, `"5m"`, or a bare number of seconds.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration '{0}': expected e.g. \"60s\", \"500ms\", \"5m\"")]
    InvalidDuration(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// What to do when a batch arrives at a full delivery queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Evict the oldest pending batch to admit the new one. Fresher
    /// metrics outrank stale ones for monitoring, so this is the
    /// default.
    #[default]
    DropOldest,
    /// Refuse the new batch and keep the backlog intact.
    RejectNew,
}

// ── Resolved configuration ────────────────────────────────────────

/// Fully-resolved pipeline configuration with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Scheduler tick period.
    pub interval: Duration,
    /// Maximum pending batches in the delivery queue.
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    /// Delivery attempts per batch before it is dropped.
    pub max_attempts: u32,
    /// First retry delay; doubles per attempt.
    pub backoff_base: Duration,
    /// Ceiling on the retry delay.
    pub backoff_cap: Duration,
    /// How long the worker waits on an empty queue before idling.
    pub dequeue_timeout: Duration,
    /// Grace period for draining pending batches on shutdown.
    pub drain_timeout: Duration,
    /// If set, only metrics whose name starts with this prefix are
    /// exported.
    pub prefix_filter: Option<String>,
    pub sink: SinkConfig,
}

/// Remote sink parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkConfig {
    /// Base URL of the push endpoint, e.g. `http://gateway:9091`.
    pub endpoint: String,
    /// Per-delivery-call timeout.
    pub timeout: Duration,
    /// Job name the sink groups pushed metrics under.
    pub job: String,
    /// Extra grouping labels attached to every push.
    pub grouping: BTreeMap<String, String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            queue_capacity: 128,
            overflow_policy: OverflowPolicy::DropOldest,
            max_attempts: 5,
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
            dequeue_timeout: Duration::from_secs(1),
            drain_timeout: Duration::from_secs(5),
            prefix_filter: None,
            sink: SinkConfig::default(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9091".to_string(),
            timeout: Duration::from_secs(10),
            job: "pulsegate".to_string(),
            grouping: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file, applying defaults for any
    /// omitted field.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;
        file.resolve()
    }

    /// Check internal consistency. Called after resolution and after
    /// any CLI overrides.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be >= 1".into()));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be >= 1".into()));
        }
        if self.backoff_cap < self.backoff_base {
            return Err(ConfigError::Invalid(
                "backoff_cap must be >= backoff_base".into(),
            ));
        }
        if self.interval.is_zero() {
            return Err(ConfigError::Invalid("interval must be > 0".into()));
        }
        Ok(())
    }
}

// ── File representation ───────────────────────────────────────────

/// On-disk form: everything optional, durations as strings.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigFile {
    interval: Option<String>,
    queue_capacity: Option<usize>,
    overflow_policy: Option<OverflowPolicy>,
    max_attempts: Option<u32>,
    backoff_base: Option<String>,
    backoff_cap: Option<String>,
    dequeue_timeout: Option<String>,
    drain_timeout: Option<String>,
    prefix_filter: Option<String>,
    sink: Option<SinkFile>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SinkFile {
    endpoint: Option<String>,
    timeout: Option<String>,
    job: Option<String>,
    grouping: Option<BTreeMap<String, String>>,
}

impl ConfigFile {
    fn resolve(self) -> Result<PipelineConfig, ConfigError> {
        let defaults = PipelineConfig::default();
        let sink_file = self.sink.unwrap_or_default();
        let sink_defaults = defaults.sink.clone();

        let config = PipelineConfig {
            interval: resolve_duration(self.interval, defaults.interval)?,
            queue_capacity: self.queue_capacity.unwrap_or(defaults.queue_capacity),
            overflow_policy: self.overflow_policy.unwrap_or(defaults.overflow_policy),
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
            backoff_base: resolve_duration(self.backoff_base, defaults.backoff_base)?,
            backoff_cap: resolve_duration(self.backoff_cap, defaults.backoff_cap)?,
            dequeue_timeout: resolve_duration(self.dequeue_timeout, defaults.dequeue_timeout)?,
            drain_timeout: resolve_duration(self.drain_timeout, defaults.drain_timeout)?,
            prefix_filter: self.prefix_filter,
            sink: SinkConfig {
                endpoint: sink_file.endpoint.unwrap_or(sink_defaults.endpoint),
                timeout: resolve_duration(sink_file.timeout, sink_defaults.timeout)?,
                job: sink_file.job.unwrap_or(sink_defaults.job),
                grouping: sink_file.grouping.unwrap_or_default(),
            },
        };
        config.validate()?;
        Ok(config)
    }
}

fn resolve_duration(value: Option<String>, default: Duration) -> Result<Duration, ConfigError> {
    match value {
        Some(s) => parse_duration(&s),
        None => Ok(default),
    }
}

/// Parse a duration string like `"5s"`, `"500ms"`, `"1m"`, or `"10"`
/// (bare seconds).
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let trimmed = s.trim();
    let parsed = if let Some(ms) = trimmed.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = trimmed.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = trimmed.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        trimmed.parse::<u64>().ok().map(Duration::from_secs)
    };
    parsed.ok_or_else(|| ConfigError::InvalidDuration(s.to_string()))
}
