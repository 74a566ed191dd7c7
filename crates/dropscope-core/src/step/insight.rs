//! Insight step: renders the human-readable finding and its confidence.
//!
//! Evidence from every breakdown list is scored with the delta family keyed
//! by each entry's base metric. Up to four distinct segments are selected
//! (a product segment first when one exists) and exposed to the templates
//! as `rank1_*` .. `rank4_*` tokens alongside every context metric and the
//! formatted fields of the top finding.

use std::collections::HashMap;

use dropscope_types::context::{AnalysisContext, MetricValue};
use dropscope_types::evidence::Evidence;
use dropscope_types::insight::{
    FINAL_INSIGHT_KEY, Insight, MATCHED_BREAKDOWN_KEY, MAX_CONFIDENCE, MIN_CONFIDENCE,
};
use dropscope_types::step::{StepDelta, StepResult};
use dropscope_types::workflow::{InsightConfig, PRODUCT_DIMENSION, StepDefinition};
use serde_json::{Map, json};

use crate::scoring::{delta_score, format_pct, format_rate_pct, round2};

/// Number of ranked segments exposed to templates.
const RANKED_SLOTS: usize = 4;

/// Sessions at which the traffic weight saturates.
const TRAFFIC_SATURATION: f64 = 1000.0;

const UNKNOWN: &str = "unknown";

pub(crate) fn run(step: &StepDefinition, cfg: &InsightConfig, ctx: &AnalysisContext) -> StepResult {
    let scored = scored_evidence(ctx);
    let selected = select_ranked(&scored);
    let top = matched_breakdown(ctx).or_else(|| selected.first().cloned());
    let confidence = confidence(top.as_ref());

    let tokens = build_tokens(ctx, top.as_ref(), &selected, confidence);
    let insight = Insight {
        summary: render_template(&cfg.template.summary, &tokens),
        details: cfg
            .template
            .details
            .iter()
            .map(|line| render_template(line, &tokens))
            .collect(),
        confidence,
    };

    tracing::info!(
        step_id = %step.id,
        evidence = scored.len(),
        top = top.as_ref().map(|e| e.label()).unwrap_or(UNKNOWN),
        confidence,
        "insight rendered"
    );

    let mut scratch = Map::new();
    scratch.insert(
        FINAL_INSIGHT_KEY.to_string(),
        json!({
            "summary": insight.summary,
            "details": insight.details,
            "confidence": insight.confidence,
        }),
    );
    StepResult::pass(Some(StepDelta::with_scratch(scratch)), step.next.clone())
}

/// Heuristic confidence in `[MIN_CONFIDENCE, MAX_CONFIDENCE]`.
///
/// `0.3 + 0.6 * share * traffic`, rounded to two decimals, where `share` is
/// the top finding's session share and `traffic` its current sessions over
/// 1000, both clamped to `[0, 1]`. Exactly `MIN_CONFIDENCE` without evidence.
pub fn confidence(top: Option<&Evidence>) -> f64 {
    let Some(entry) = top else {
        return MIN_CONFIDENCE;
    };
    let share = if entry.session_share.is_finite() {
        entry.session_share.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let traffic = (entry.current.sessions as f64 / TRAFFIC_SATURATION).clamp(0.0, 1.0);
    round2(MIN_CONFIDENCE + (MAX_CONFIDENCE - MIN_CONFIDENCE) * share * traffic)
        .clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

/// Replace every `{{ token }}` with its value, or `unknown` when absent.
///
/// Whitespace inside the braces is ignored. An unclosed `{{` is kept as-is.
pub fn render_template(template: &str, tokens: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let inner = &rest[open + 2..];
        let Some(close) = inner.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };
        let key = inner[..close].trim();
        out.push_str(tokens.get(key).map(String::as_str).unwrap_or(UNKNOWN));
        rest = &inner[close + 2..];
    }

    out.push_str(rest);
    out
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// All evidence, best delta score first.
fn scored_evidence(ctx: &AnalysisContext) -> Vec<Evidence> {
    let mut all: Vec<Evidence> = ctx.breakdowns.values().flatten().cloned().collect();
    all.sort_by(|a, b| delta_score(b).total_cmp(&delta_score(a)));
    all
}

/// Up to four distinct segments: the best product segment, then by score.
fn select_ranked(scored: &[Evidence]) -> Vec<Evidence> {
    let mut picked: Vec<&Evidence> = Vec::with_capacity(RANKED_SLOTS);
    if let Some(product) = scored.iter().find(|e| e.dimension == PRODUCT_DIMENSION) {
        picked.push(product);
    }
    for entry in scored {
        if picked.len() >= RANKED_SLOTS {
            break;
        }
        if !picked.iter().any(|p| p.same_segment(entry)) {
            picked.push(entry);
        }
    }
    picked.into_iter().cloned().collect()
}

fn matched_breakdown(ctx: &AnalysisContext) -> Option<Evidence> {
    let raw = ctx.scratch.get(MATCHED_BREAKDOWN_KEY)?;
    serde_json::from_value(raw.clone()).ok()
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

struct Tokens(HashMap<String, String>);

impl Tokens {
    fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    fn set_metric(&mut self, key: impl Into<String>, value: &MetricValue) {
        if !value.is_missing() {
            self.set(key, value.to_string());
        }
    }
}

fn build_tokens(
    ctx: &AnalysisContext,
    top: Option<&Evidence>,
    ranked: &[Evidence],
    confidence: f64,
) -> HashMap<String, String> {
    let mut t = Tokens(HashMap::new());

    for (key, value) in &ctx.metrics {
        t.set_metric(key.as_str(), value);
    }

    if let Some(meta) = &ctx.meta {
        t.set("tenant_id", meta.tenant_id.as_str());
        t.set("metric", meta.metric.as_str());
    }

    for name in ["cvr", "sessions", "orders", "atc_rate"] {
        let delta = ctx.metric_f64(&format!("{name}_delta_pct"));
        t.set(format!("{name}_delta_pct_fmt"), format_pct(delta));
    }
    t.set("current_cvr_pct", format_rate_pct(ctx.metric_f64("current_cvr")));
    t.set("baseline_cvr_pct", format_rate_pct(ctx.metric_f64("baseline_cvr")));
    t.set("current_atc_rate_pct", format_rate_pct(ctx.metric_f64("current_atc_rate")));
    t.set("baseline_atc_rate_pct", format_rate_pct(ctx.metric_f64("baseline_atc_rate")));

    if let Some(top) = top {
        t.set("dimension", top.dimension.as_str());
        t.set("value", top.value.as_str());
        t.set("display_value", top.display_value.as_str());
        t.set("top_label", top.label());
        t.set("top_dimension", top.dimension.as_str());
        t.set("top_value", top.value.as_str());
        t.set("top_display_value", top.display_value.as_str());
        t.set("top_current_cvr_pct", format_rate_pct(top.current.cvr));
        t.set("top_baseline_cvr_pct", format_rate_pct(top.baseline.cvr));
        t.set("top_current_atc_rate_pct", format_rate_pct(top.current.atc_rate));
        t.set("top_baseline_atc_rate_pct", format_rate_pct(top.baseline.atc_rate));
        t.set("top_cvr_delta_pct_fmt", format_pct(top.deltas.cvr_delta_pct));
        t.set("top_sessions_delta_pct_fmt", format_pct(top.deltas.sessions_delta_pct));
        t.set("top_orders_delta_pct_fmt", format_pct(top.deltas.orders_delta_pct));
        t.set("top_atc_rate_delta_pct_fmt", format_pct(top.deltas.atc_rate_delta_pct));
        t.set("top_current_sessions", top.current.sessions.to_string());
        t.set("top_baseline_sessions", top.baseline.sessions.to_string());
        t.set("top_current_orders", top.current.orders.to_string());
        t.set("top_baseline_orders", top.baseline.orders.to_string());
        t.set("top_session_share_pct", format_rate_pct(Some(top.session_share)));
    }

    for (idx, entry) in ranked.iter().enumerate() {
        let p = format!("rank{}", idx + 1);
        t.set(format!("{p}_dimension"), entry.dimension.as_str());
        t.set(format!("{p}_label"), entry.label());
        t.set(format!("{p}_display_value"), entry.display_value.as_str());
        t.set(format!("{p}_cvr_delta_pct_fmt"), format_pct(entry.deltas.cvr_delta_pct));
        t.set(
            format!("{p}_sessions_delta_pct_fmt"),
            format_pct(entry.deltas.sessions_delta_pct),
        );
        t.set(
            format!("{p}_orders_delta_pct_fmt"),
            format_pct(entry.deltas.orders_delta_pct),
        );
        t.set(
            format!("{p}_atc_rate_delta_pct_fmt"),
            format_pct(entry.deltas.atc_rate_delta_pct),
        );
        t.set(format!("{p}_baseline_cvr_pct"), format_rate_pct(entry.baseline.cvr));
    }

    t.set("evidence_count", ranked.len().to_string());
    t.set("confidence_score", confidence.to_string());
    t.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
