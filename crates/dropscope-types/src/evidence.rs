//! Scored candidate segments produced by the recursive dimension breakdown.

use serde::{Deserialize, Serialize};

use crate::workflow::BaseMetric;

/// Raw counts and derived rates for one segment in one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentFigures {
    pub orders: u64,
    pub sessions: u64,
    pub atc_sessions: u64,
    pub cvr: Option<f64>,
    pub atc_rate: Option<f64>,
}

/// Percentage change current vs. baseline; `None` when the baseline is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentDeltas {
    pub cvr_delta_pct: Option<f64>,
    pub atc_rate_delta_pct: Option<f64>,
    pub atc_sessions_delta_pct: Option<f64>,
    pub orders_delta_pct: Option<f64>,
    pub sessions_delta_pct: Option<f64>,
}

/// One scored dimension-value segment.
///
/// Immutable once appended to `context.breakdowns`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub dimension: String,
    pub value: String,
    pub display_value: String,
    pub depth: usize,
    pub current: SegmentFigures,
    pub baseline: SegmentFigures,
    pub deltas: SegmentDeltas,
    #[serde(rename = "sessionShare")]
    pub session_share: f64,
    #[serde(rename = "orderShare")]
    pub order_share: f64,
    #[serde(rename = "baselineSessionShare")]
    pub baseline_session_share: f64,
    #[serde(rename = "baselineOrderShare")]
    pub baseline_order_share: f64,
    pub base_metric: BaseMetric,
}

impl Evidence {
    /// Label shown to humans: the display value, falling back to the raw value.
    pub fn label(&self) -> &str {
        if self.display_value.is_empty() {
            &self.value
        } else {
            &self.display_value
        }
    }

    /// Whether two entries describe the same segment (dimension + value).
    pub fn same_segment(&self, other: &Evidence) -> bool {
        self.dimension == other.dimension && self.value == other.value
    }
}
