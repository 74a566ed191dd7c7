//! Query intents handed to an analytics source.
//!
//! The core only describes what it needs; adapters decide how to fetch it.

use chrono::NaiveDateTime;
use dropscope_types::context::{Filter, RunMeta};
use dropscope_types::workflow::PRODUCT_DIMENSION;
use serde::Serialize;

/// A fully-bounded `[start, end)` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Why a query intent could not be built from run meta.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryIntentError {
    #[error("tenant id is required")]
    MissingTenant,
    #[error("current window needs both start and end")]
    MissingWindow,
    #[error("baseline window needs both start and end")]
    MissingBaselineWindow,
}

fn windows(meta: &RunMeta) -> Result<(WindowRange, WindowRange), QueryIntentError> {
    if meta.tenant_id.trim().is_empty() {
        return Err(QueryIntentError::MissingTenant);
    }
    let (start, end) = meta
        .window
        .and_then(|w| w.bounds())
        .ok_or(QueryIntentError::MissingWindow)?;
    let (b_start, b_end) = meta
        .baseline_window
        .and_then(|w| w.bounds())
        .ok_or(QueryIntentError::MissingBaselineWindow)?;
    Ok((
        WindowRange { start, end },
        WindowRange {
            start: b_start,
            end: b_end,
        },
    ))
}

/// Current vs. baseline totals for a tenant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricQuery {
    pub tenant_id: String,
    pub metrics: Vec<String>,
    pub window: WindowRange,
    pub baseline_window: WindowRange,
}

impl MetricQuery {
    pub fn from_meta(meta: &RunMeta, metrics: &[String]) -> Result<Self, QueryIntentError> {
        let (window, baseline_window) = windows(meta)?;
        Ok(Self {
            tenant_id: meta.tenant_id.clone(),
            metrics: metrics.to_vec(),
            window,
            baseline_window,
        })
    }
}

/// Per-value figures for one dimension under a set of active filters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakdownQuery {
    pub tenant_id: String,
    pub dimension: String,
    pub window: WindowRange,
    pub baseline_window: WindowRange,
    pub filters: Vec<Filter>,
}

impl BreakdownQuery {
    pub fn from_meta(
        meta: &RunMeta,
        dimension: impl Into<String>,
        filters: Vec<Filter>,
    ) -> Result<Self, QueryIntentError> {
        let (window, baseline_window) = windows(meta)?;
        Ok(Self {
            tenant_id: meta.tenant_id.clone(),
            dimension: dimension.into(),
            window,
            baseline_window,
            filters,
        })
    }

    /// Same tenant and windows, a different dimension and filter set.
    pub fn refine(&self, dimension: impl Into<String>, filters: Vec<Filter>) -> Self {
        Self {
            tenant_id: self.tenant_id.clone(),
            dimension: dimension.into(),
            window: self.window,
            baseline_window: self.baseline_window,
            filters,
        }
    }

    /// Product rows carry a display title; other dimensions do not.
    pub fn wants_titles(&self) -> bool {
        self.dimension == PRODUCT_DIMENSION
    }
}
