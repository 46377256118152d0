//! Prometheus text exposition rendering.
//!
//! One metric family per tracked metric, with derived families for
//! distribution extremes and rates:
//!
//! ```text
//! Counter   → <name> (counter)
//! Gauge     → <name> (gauge)
//! Meter     → <name>_rate (gauge, events/sec)
//! Histogram → <name> (summary: quantiles, _count, _sum)
//!             + <name>_min/_max/_stddev (gauges)
//! Timer     → histogram families + <name>_rate (gauge)
//! ```
//!
//! Configured grouping labels are rendered on every sample line.
//! Pushed payloads carry no per-sample timestamps (push gateways
//! reject them); the capture time appears as a header comment only.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use bytes::Bytes;
use thiserror::Error;

use pulsegate_core::types::{EncodedBatch, MetricSnapshot, MetricValue, SummaryStats};

/// Errors raised while encoding a snapshot.
///
/// All encode errors are local and non-retryable: the tick's batch is
/// skipped, logged, and the pipeline moves on.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("metrics '{first}' and '{second}' both normalize to family '{family}'")]
    NameCollision {
        first: String,
        second: String,
        family: String,
    },

    #[error("empty metric name")]
    EmptyName,
}

/// Encode a snapshot into a wire-ready batch.
///
/// Deterministic: snapshot values and labels are iterated in name
/// order and the output depends only on the inputs.
pub fn encode(
    snapshot: &MetricSnapshot,
    sequence: u64,
    labels: &BTreeMap<String, String>,
) -> Result<EncodedBatch, EncodeError> {
    let mut enc = LineEncoder::new(labels)?;

    let _ = writeln!(
        enc.out,
        "# pulsegate batch seq={} captured_at={}",
        sequence, snapshot.captured_at
    );

    for (name, value) in &snapshot.values {
        let base = normalize_name(name)?;
        match value {
            MetricValue::Counter(v) => {
                enc.family(&base, name, "counter")?;
                enc.sample(&base, None, &v.to_string());
            }
            MetricValue::Gauge(v) => {
                enc.family(&base, name, "gauge")?;
                enc.sample(&base, None, &fmt_float(*v));
            }
            MetricValue::Meter { rate } => {
                enc.rate_family(&base, name, *rate)?;
            }
            MetricValue::Histogram(summary) => {
                enc.summary_families(&base, name, summary)?;
            }
            MetricValue::Timer { summary, rate } => {
                enc.summary_families(&base, name, summary)?;
                enc.rate_family(&base, name, *rate)?;
            }
        }
    }

    Ok(EncodedBatch::new(sequence, Bytes::from(enc.out)))
}

/// Incremental exposition writer with family bookkeeping.
struct LineEncoder {
    out: String,
    /// Rendered `k="v"` pairs shared by every sample line.
    label_str: String,
    /// Families already emitted, mapped back to the input name that
    /// produced them, for collision reporting.
    families: HashMap<String, String>,
}

impl LineEncoder {
    fn new(labels: &BTreeMap<String, String>) -> Result<Self, EncodeError> {
        let mut label_str = String::new();
        for (k, v) in labels {
            if !label_str.is_empty() {
                label_str.push(',');
            }
            let _ = write!(label_str, "{}=\"{}\"", normalize_name(k)?, escape_label_value(v));
        }
        Ok(Self {
            out: String::new(),
            label_str,
            families: HashMap::new(),
        })
    }

    /// Register and declare a new family, failing if another input
    /// metric already produced the same family name.
    fn family(&mut self, family: &str, input: &str, kind: &str) -> Result<(), EncodeError> {
        if let Some(first) = self.families.get(family) {
            return Err(EncodeError::NameCollision {
                first: first.clone(),
                second: input.to_string(),
                family: family.to_string(),
            });
        }
        self.families.insert(family.to_string(), input.to_string());
        let _ = writeln!(self.out, "# TYPE {family} {kind}");
        Ok(())
    }

    /// Write one sample line, merging shared labels with an optional
    /// extra label (the summary quantile).
    fn sample(&mut self, name: &str, extra: Option<(&str, &str)>, value: &str) {
        let mut labels = self.label_str.clone();
        if let Some((k, v)) = extra {
            if !labels.is_empty() {
                labels.push(',');
            }
            let _ = write!(labels, "{k}=\"{v}\"");
        }
        if labels.is_empty() {
            let _ = writeln!(self.out, "{name} {value}");
        } else {
            let _ = writeln!(self.out, "{name}{{{labels}}} {value}");
        }
    }

    fn rate_family(&mut self, base: &str, input: &str, rate: f64) -> Result<(), EncodeError> {
        let family = format!("{base}_rate");
        self.family(&family, input, "gauge")?;
        self.sample(&family, None, &fmt_float(rate));
        Ok(())
    }

    fn summary_families(
        &mut self,
        base: &str,
        input: &str,
        summary: &SummaryStats,
    ) -> Result<(), EncodeError> {
        self.family(base, input, "summary")?;
        for (q, v) in &summary.quantiles {
            let quantile = fmt_float(*q);
            self.sample(base, Some(("quantile", &quantile)), &fmt_float(*v));
        }
        self.sample(&format!("{base}_count"), None, &summary.count.to_string());
        self.sample(
            &format!("{base}_sum"),
            None,
            &fmt_float(summary.mean * summary.count as f64),
        );

        for (suffix, v) in [
            ("min", summary.min),
            ("max", summary.max),
            ("stddev", summary.stddev),
        ] {
            let family = format!("{base}_{suffix}");
            self.family(&family, input, "gauge")?;
            self.sample(&family, None, &fmt_float(v));
        }
        Ok(())
    }
}

/// Normalize a metric name to the exposition charset `[a-zA-Z0-9_:]`,
/// substituting `_` for anything else and guarding a leading digit.
pub fn normalize_name(name: &str) -> Result<String, EncodeError> {
    if name.is_empty() {
        return Err(EncodeError::EmptyName);
    }
    let mut normalized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if normalized.starts_with(|c: char| c.is_ascii_digit()) {
        normalized.insert(0, '_');
    }
    Ok(normalized)
}

/// Escape a label value per the exposition format: backslash, double
/// quote, and newline.
pub fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Format a float the way the exposition format expects, including
/// the spellings for infinities and NaN.
fn fmt_float(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "+Inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        format!("{v}")
    }
}
