//! Analytics data-source port.
//!
//! Implementations live in dropscope-infra (e.g., SqliteAnalyticsSource).
//! Uses native async fn in traits (Rust 2024 edition, no async_trait macro).

pub mod query;

use std::collections::HashSet;
use std::sync::Mutex;

use dropscope_types::analytics::{DimensionRow, MetricTotalsRow};
use dropscope_types::context::Filter;
use dropscope_types::error::SourceError;
use serde::{Deserialize, Serialize};

pub use query::{BreakdownQuery, MetricQuery, QueryIntentError, WindowRange};

/// Source of aggregate analytics rows.
///
/// The core only describes query intent; adapters own SQL and transport.
pub trait AnalyticsSource: Send + Sync {
    /// One current vs. baseline totals row, or `None` when the source has no data.
    fn metric_totals(
        &self,
        query: &MetricQuery,
    ) -> impl std::future::Future<Output = Result<Option<MetricTotalsRow>, SourceError>> + Send;

    /// One row per distinct value of `query.dimension` under `query.filters`.
    fn dimension_breakdown(
        &self,
        query: &BreakdownQuery,
    ) -> impl std::future::Future<Output = Result<Vec<DimensionRow>, SourceError>> + Send;
}

// ---------------------------------------------------------------------------
// StaticSource
// ---------------------------------------------------------------------------

/// Canned rows for one dimension under one exact filter set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticBreakdown {
    pub dimension: String,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub rows: Vec<DimensionRow>,
}

impl StaticBreakdown {
    fn matches(&self, query: &BreakdownQuery) -> bool {
        if self.dimension != query.dimension || self.filters.len() != query.filters.len() {
            return false;
        }
        let wanted: HashSet<&Filter> = self.filters.iter().collect();
        query.filters.iter().all(|f| wanted.contains(f))
    }
}

/// In-memory analytics source serving canned rows.
///
/// Breakdown rows are matched on dimension plus the exact (order-insensitive)
/// filter set; unmatched queries return no rows. Every breakdown query is
/// recorded so callers can inspect the drill-down path.
#[derive(Debug, Default)]
pub struct StaticSource {
    totals: Option<MetricTotalsRow>,
    breakdowns: Vec<StaticBreakdown>,
    requests: Mutex<Vec<BreakdownQuery>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(totals: Option<MetricTotalsRow>, breakdowns: Vec<StaticBreakdown>) -> Self {
        Self {
            totals,
            breakdowns,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_totals(mut self, totals: MetricTotalsRow) -> Self {
        self.totals = Some(totals);
        self
    }

    pub fn with_breakdown(
        mut self,
        dimension: impl Into<String>,
        filters: Vec<Filter>,
        rows: Vec<DimensionRow>,
    ) -> Self {
        self.breakdowns.push(StaticBreakdown {
            dimension: dimension.into(),
            filters,
            rows,
        });
        self
    }

    /// Breakdown queries received so far, in arrival order.
    pub fn breakdown_requests(&self) -> Vec<BreakdownQuery> {
        self.requests
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }
}

impl AnalyticsSource for StaticSource {
    async fn metric_totals(
        &self,
        _query: &MetricQuery,
    ) -> Result<Option<MetricTotalsRow>, SourceError> {
        Ok(self.totals)
    }

    async fn dimension_breakdown(
        &self,
        query: &BreakdownQuery,
    ) -> Result<Vec<DimensionRow>, SourceError> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(query.clone());
        }
        Ok(self
            .breakdowns
            .iter()
            .find(|b| b.matches(query))
            .map(|b| b.rows.clone())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
