//! The analysis context threaded through a workflow run.
//!
//! `AnalysisContext` is created once per run by the caller and mutated by the
//! runner through context merge. It has no behavior of its own beyond a few
//! accessors; merge rules live in `dropscope-core::merge`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::evidence::Evidence;

// ---------------------------------------------------------------------------
// Meta
// ---------------------------------------------------------------------------

/// Run-scoped facts set once at run start and never overwritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMeta {
    #[serde(default)]
    pub tenant_id: String,
    /// Target metric name (e.g. "cvr").
    #[serde(default)]
    pub metric: String,
    /// When the alert fired, as reported by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<TimeWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_window: Option<TimeWindow>,
}

impl RunMeta {
    pub fn new(
        tenant_id: impl Into<String>,
        metric: impl Into<String>,
        window: TimeWindow,
        baseline_window: TimeWindow,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            metric: metric.into(),
            triggered_at: None,
            window: Some(window),
            baseline_window: Some(baseline_window),
        }
    }
}

/// A half-open `[start, end)` time range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(default, with = "window_time")]
    pub start: Option<NaiveDateTime>,
    #[serde(default, with = "window_time")]
    pub end: Option<NaiveDateTime>,
}

impl TimeWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Both bounds, when present.
    pub fn bounds(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        Some((self.start?, self.end?))
    }

    pub fn is_complete(&self) -> bool {
        self.bounds().is_some()
    }
}

/// Serde adapter for window bounds.
///
/// Accepts `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` and an optional
/// trailing `Z`; writes the space-separated form.
pub mod window_time {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn parse(raw: &str) -> Result<NaiveDateTime, chrono::ParseError> {
        let normalized = raw.trim().trim_end_matches('Z').replacen('T', " ", 1);
        NaiveDateTime::parse_from_str(&normalized, FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M:%S%.f"))
    }

    pub fn serialize<S: Serializer>(
        value: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_str(&v.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => parse(s).map(Some).map_err(serde::de::Error::custom),
        }
    }
}

// ---------------------------------------------------------------------------
// Filters / metrics / trace
// ---------------------------------------------------------------------------

/// A `{dimension, value}` constraint added as a breakdown drills down.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Filter {
    pub dimension: String,
    pub value: String,
}

impl Filter {
    pub fn new(dimension: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            dimension: dimension.into(),
            value: value.into(),
        }
    }
}

/// A value stored in `context.metrics`.
///
/// Deltas are nullable (`Missing`) when their baseline denominator is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Flag(bool),
    Text(String),
    Missing,
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, MetricValue::Missing)
    }

    /// JSON form, used when comparing against condition literals.
    pub fn to_json(&self) -> Value {
        match self {
            MetricValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            MetricValue::Flag(b) => Value::Bool(*b),
            MetricValue::Text(s) => Value::String(s.clone()),
            MetricValue::Missing => Value::Null,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(n) => write!(f, "{n}"),
            MetricValue::Flag(b) => write!(f, "{b}"),
            MetricValue::Text(s) => f.write_str(s),
            MetricValue::Missing => f.write_str("null"),
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Number(value)
    }
}

impl From<u64> for MetricValue {
    fn from(value: u64) -> Self {
        MetricValue::Number(value as f64)
    }
}

impl From<Option<f64>> for MetricValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(MetricValue::Missing, MetricValue::Number)
    }
}

impl From<bool> for MetricValue {
    fn from(value: bool) -> Self {
        MetricValue::Flag(value)
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        MetricValue::Text(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::Text(value.to_string())
    }
}

/// Metric name to value, ordered for stable output.
pub type Metrics = BTreeMap<String, MetricValue>;

/// Breakdown key (dimension or custom output key) to evidence list.
pub type Breakdowns = BTreeMap<String, Vec<Evidence>>;

/// One dispatched step, appended by the runner before the step runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEntry {
    pub step_id: String,
    #[serde(rename = "type")]
    pub step_type: String,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// AnalysisContext
// ---------------------------------------------------------------------------

/// Mutable state shared by every step of one run.
///
/// Exactly one run owns a context instance at a time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisContext {
    /// `None` only when the caller supplied no context at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<RunMeta>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub metrics: Metrics,
    #[serde(default)]
    pub root_cause_path: Vec<Value>,
    #[serde(default)]
    pub breakdowns: Breakdowns,
    #[serde(default)]
    pub scratch: Map<String, Value>,
    #[serde(default)]
    pub execution_trace: Vec<TraceEntry>,
}

impl AnalysisContext {
    pub fn new(meta: RunMeta) -> Self {
        Self {
            meta: Some(meta),
            ..Default::default()
        }
    }

    pub fn metric(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.get(name)
    }

    /// Numeric metric value; `None` when absent, null or non-numeric.
    pub fn metric_f64(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).and_then(MetricValue::as_f64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
