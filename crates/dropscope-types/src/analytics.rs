//! Row shapes returned by an analytics data source.

use serde::{Deserialize, Serialize};

/// Current vs. baseline totals for the whole tenant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricTotalsRow {
    pub current_sessions: u64,
    pub baseline_sessions: u64,
    #[serde(default)]
    pub current_atc_sessions: u64,
    #[serde(default)]
    pub baseline_atc_sessions: u64,
    pub current_orders: u64,
    pub baseline_orders: u64,
}

/// Current vs. baseline figures for one value of a dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionRow {
    pub dimension_value: String,
    /// Only populated for the product dimension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_title: Option<String>,
    #[serde(default)]
    pub current_sessions: u64,
    #[serde(default)]
    pub baseline_sessions: u64,
    #[serde(default)]
    pub current_atc_sessions: u64,
    #[serde(default)]
    pub baseline_atc_sessions: u64,
    #[serde(default)]
    pub current_orders: u64,
    #[serde(default)]
    pub baseline_orders: u64,
}
