//! Recursive dimension breakdown step.
//!
//! Slices the tenant's traffic by one dimension per depth, keeps the `top_k`
//! best-scoring segments at each level, and drills into each kept segment
//! with its `{dimension, value}` appended to the active filters. The walk is
//! a pre-order depth-first traversal driven by an explicit stack, so the
//! evidence order matches "append the candidate, then explore below it".
//!
//! After the walk, evidence is deduplicated by `(dimension, value, depth)`
//! and re-ranked; the first entry is the step's top finding.

use std::collections::HashMap;

use dropscope_types::analytics::DimensionRow;
use dropscope_types::context::{AnalysisContext, Breakdowns, Filter, MetricValue, Metrics};
use dropscope_types::error::SourceError;
use dropscope_types::evidence::{Evidence, SegmentDeltas, SegmentFigures};
use dropscope_types::step::{StepDelta, StepResult};
use dropscope_types::workflow::{
    BaseMetric, BreakdownConfig, FilterMode, MinSessionsMode, PRODUCT_DIMENSION, StepDefinition,
};

use super::StepError;
use crate::scoring::{self, pct_change, rate, rate_change, share};
use crate::source::{AnalyticsSource, BreakdownQuery};

pub(crate) async fn run<S: AnalyticsSource>(
    source: &S,
    step: &StepDefinition,
    cfg: &BreakdownConfig,
    ctx: &AnalysisContext,
) -> Result<StepResult, StepError> {
    let dimensions = cfg.dimension_list();
    if dimensions.is_empty() || dimensions.iter().any(|d| d.trim().is_empty()) {
        return Ok(StepResult::fail(
            "breakdown: dimension is missing or invalid",
        ));
    }

    if ctx.metric_f64("cvr_delta_pct").is_none() {
        return Ok(StepResult::fail(
            "breakdown: global metrics missing, run a metric comparison first",
        ));
    }

    let Some(meta) = &ctx.meta else {
        return Ok(StepResult::fail("breakdown: missing meta in context"));
    };
    let root = match BreakdownQuery::from_meta(meta, dimensions[0].clone(), ctx.filters.clone()) {
        Ok(query) => query,
        Err(e) => return Ok(StepResult::fail(format!("breakdown: {e}"))),
    };

    let walker = Walker {
        source,
        cfg,
        dimensions: &dimensions,
    };
    let collected = walker.walk(&root).await?;
    let collected_len = collected.len();

    let mut ranked = dedupe(collected);
    scoring::rank(&mut ranked, cfg.rank_by, cfg.rank_order);

    tracing::info!(
        step_id = %step.id,
        collected = collected_len,
        evidence = ranked.len(),
        top = ranked.first().map(|e| e.label()).unwrap_or("none"),
        "breakdown complete"
    );

    let mut metrics = ranked.first().map(top_metrics).unwrap_or_default();
    let output_key = cfg
        .output_key
        .as_deref()
        .filter(|k| !k.trim().is_empty());
    if let Some(key) = output_key {
        metrics.insert(
            key.to_string(),
            MetricValue::Text(scoring::format_ranked_list(
                &ranked,
                cfg.rank_by,
                cfg.base_metric,
            )),
        );
    }

    let breakdown_key = output_key.unwrap_or(dimensions[0].as_str()).to_string();
    let delta = StepDelta {
        metrics: Some(metrics),
        breakdowns: Some(Breakdowns::from([(breakdown_key, ranked)])),
        ..Default::default()
    };
    Ok(StepResult::pass(Some(delta), step.next.clone()))
}

// ---------------------------------------------------------------------------
// Walk
// ---------------------------------------------------------------------------

struct Walker<'a, S> {
    source: &'a S,
    cfg: &'a BreakdownConfig,
    dimensions: &'a [String],
}

/// Per-level totals used for share computation.
#[derive(Debug, Default)]
struct LevelTotals {
    current_sessions: u64,
    baseline_sessions: u64,
    current_orders: u64,
    baseline_orders: u64,
}

impl LevelTotals {
    fn from_rows(rows: &[DimensionRow]) -> Self {
        rows.iter().fold(Self::default(), |acc, row| Self {
            current_sessions: acc.current_sessions.saturating_add(row.current_sessions),
            baseline_sessions: acc.baseline_sessions.saturating_add(row.baseline_sessions),
            current_orders: acc.current_orders.saturating_add(row.current_orders),
            baseline_orders: acc.baseline_orders.saturating_add(row.baseline_orders),
        })
    }
}

impl<S: AnalyticsSource> Walker<'_, S> {
    /// Pre-order depth-first collection of every kept candidate.
    async fn walk(&self, root: &BreakdownQuery) -> Result<Vec<Evidence>, SourceError> {
        let mut evidence = Vec::new();
        let mut stack: Vec<(Evidence, Vec<Filter>)> = Vec::new();

        let top_level = self.expand(root, &root.filters, 0).await?;
        stack.extend(
            top_level
                .into_iter()
                .rev()
                .map(|e| (e, root.filters.clone())),
        );

        while let Some((entry, mut filters)) = stack.pop() {
            filters.push(Filter::new(entry.dimension.clone(), entry.value.clone()));
            let depth = entry.depth + 1;
            evidence.push(entry);

            let children = self.expand(root, &filters, depth).await?;
            stack.extend(children.into_iter().rev().map(|c| (c, filters.clone())));
        }

        Ok(evidence)
    }

    /// Fetch, score and truncate one level.
    async fn expand(
        &self,
        root: &BreakdownQuery,
        filters: &[Filter],
        depth: usize,
    ) -> Result<Vec<Evidence>, SourceError> {
        let stop = &self.cfg.stop_conditions;
        if depth >= stop.max_depth || depth >= self.dimensions.len() {
            return Ok(Vec::new());
        }

        let dimension = &self.dimensions[depth];
        let query = root.refine(dimension.clone(), filters.to_vec());
        let rows = self.source.dimension_breakdown(&query).await?;

        let totals = LevelTotals::from_rows(&rows);
        if totals.current_sessions == 0 && totals.baseline_sessions == 0 {
            tracing::debug!(dimension = %dimension, depth, rows = rows.len(), "no sessions at level");
            return Ok(Vec::new());
        }

        let mut candidates: Vec<Evidence> = rows
            .iter()
            .filter_map(|row| self.candidate(row, dimension, depth, &totals, filters))
            .collect();
        let candidate_count = candidates.len();

        scoring::rank(&mut candidates, self.cfg.rank_by, self.cfg.rank_order);
        candidates.truncate(stop.top_k);

        tracing::debug!(
            dimension = %dimension,
            depth,
            rows = rows.len(),
            candidates = candidate_count,
            kept = candidates.len(),
            "breakdown level ranked"
        );
        Ok(candidates)
    }

    fn passes_session_gate(&self, row: &DimensionRow) -> bool {
        let stop = &self.cfg.stop_conditions;
        let current_low = row.current_sessions < stop.current_threshold();
        let baseline_low = row.baseline_sessions < stop.baseline_threshold();
        let skip = match self.cfg.min_sessions_mode {
            MinSessionsMode::BothLow => current_low && baseline_low,
            MinSessionsMode::EitherLow => current_low || baseline_low,
            MinSessionsMode::BaselineOnly => baseline_low,
        };
        !skip
    }

    fn candidate(
        &self,
        row: &DimensionRow,
        dimension: &str,
        depth: usize,
        totals: &LevelTotals,
        filters: &[Filter],
    ) -> Option<Evidence> {
        // A segment already on the drill path is never re-added below itself.
        if filters
            .iter()
            .any(|f| f.dimension == dimension && f.value == row.dimension_value)
        {
            return None;
        }
        if !self.passes_session_gate(row) {
            return None;
        }

        let current = figures(row.current_orders, row.current_sessions, row.current_atc_sessions);
        let baseline = figures(
            row.baseline_orders,
            row.baseline_sessions,
            row.baseline_atc_sessions,
        );

        let base_metric = self.cfg.base_metric;
        let usable = match base_metric {
            BaseMetric::AtcRate => {
                current.atc_rate.is_some() && baseline.atc_rate.is_some_and(|r| r != 0.0)
            }
            _ => current.cvr.is_some() && baseline.cvr.is_some_and(|r| r != 0.0),
        };
        if !usable {
            return None;
        }

        let deltas = SegmentDeltas {
            cvr_delta_pct: rate_change(current.cvr, baseline.cvr),
            atc_rate_delta_pct: rate_change(current.atc_rate, baseline.atc_rate),
            atc_sessions_delta_pct: pct_change(
                current.atc_sessions as f64,
                baseline.atc_sessions as f64,
            ),
            orders_delta_pct: pct_change(current.orders as f64, baseline.orders as f64),
            sessions_delta_pct: pct_change(current.sessions as f64, baseline.sessions as f64),
        };

        let relevant = match base_metric {
            BaseMetric::AtcRate => deltas.atc_rate_delta_pct,
            _ => deltas.cvr_delta_pct,
        };
        let keep = match self.cfg.filter_mode {
            FilterMode::Drop => relevant.is_some_and(|d| d < 0.0),
            FilterMode::Increase => relevant.is_some_and(|d| d > 0.0),
            FilterMode::All => true,
        };
        if !keep {
            return None;
        }

        let baseline_session_share = share(row.baseline_sessions, totals.baseline_sessions);
        let current_session_share = share(row.current_sessions, totals.current_sessions);
        let baseline_order_share = share(row.baseline_orders, totals.baseline_orders);
        let current_order_share = share(row.current_orders, totals.current_orders);

        let display_value = match (&row.product_title, dimension == PRODUCT_DIMENSION) {
            (Some(title), true) if !title.trim().is_empty() => title.clone(),
            _ => row.dimension_value.clone(),
        };

        Some(Evidence {
            dimension: dimension.to_string(),
            value: row.dimension_value.clone(),
            display_value,
            depth,
            current,
            baseline,
            deltas,
            session_share: baseline_session_share.max(current_session_share),
            order_share: baseline_order_share.max(current_order_share),
            baseline_session_share,
            baseline_order_share,
            base_metric,
        })
    }
}

fn figures(orders: u64, sessions: u64, atc_sessions: u64) -> SegmentFigures {
    SegmentFigures {
        orders,
        sessions,
        atc_sessions,
        cvr: rate(orders, sessions),
        atc_rate: rate(atc_sessions, sessions),
    }
}

// ---------------------------------------------------------------------------
// Post-processing
// ---------------------------------------------------------------------------

/// Collapse `(dimension, value, depth)` collisions, keeping the larger
/// `session_share` in the slot of the first occurrence.
fn dedupe(entries: Vec<Evidence>) -> Vec<Evidence> {
    let mut out: Vec<Evidence> = Vec::with_capacity(entries.len());
    let mut slots: HashMap<(String, String, usize), usize> = HashMap::new();

    for entry in entries {
        let key = (entry.dimension.clone(), entry.value.clone(), entry.depth);
        match slots.get(&key) {
            Some(&idx) => {
                if entry.session_share > out[idx].session_share {
                    out[idx] = entry;
                }
            }
            None => {
                slots.insert(key, out.len());
                out.push(entry);
            }
        }
    }
    out
}

/// `top_*` summary metrics drawn from the top finding.
fn top_metrics(top: &Evidence) -> Metrics {
    [
        ("top_dimension", MetricValue::from(top.dimension.as_str())),
        ("top_value", MetricValue::from(top.value.as_str())),
        ("top_display_value", MetricValue::from(top.display_value.as_str())),
        ("top_depth", MetricValue::from(top.depth as u64)),
        ("top_cvr_delta_pct", MetricValue::from(top.deltas.cvr_delta_pct)),
        ("top_atc_rate_delta_pct", MetricValue::from(top.deltas.atc_rate_delta_pct)),
        (
            "top_atc_sessions_delta_pct",
            MetricValue::from(top.deltas.atc_sessions_delta_pct),
        ),
        ("top_orders_delta_pct", MetricValue::from(top.deltas.orders_delta_pct)),
        ("top_sessions_delta_pct", MetricValue::from(top.deltas.sessions_delta_pct)),
        ("top_current_sessions", MetricValue::from(top.current.sessions)),
        ("top_baseline_sessions", MetricValue::from(top.baseline.sessions)),
        ("top_current_orders", MetricValue::from(top.current.orders)),
        ("top_baseline_orders", MetricValue::from(top.baseline.orders)),
        ("top_current_atc_sessions", MetricValue::from(top.current.atc_sessions)),
        ("top_baseline_atc_sessions", MetricValue::from(top.baseline.atc_sessions)),
        ("top_current_cvr", MetricValue::from(top.current.cvr)),
        ("top_baseline_cvr", MetricValue::from(top.baseline.cvr)),
        ("top_current_atc_rate", MetricValue::from(top.current.atc_rate)),
        ("top_baseline_atc_rate", MetricValue::from(top.baseline.atc_rate)),
        ("top_session_share", MetricValue::from(top.session_share)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
