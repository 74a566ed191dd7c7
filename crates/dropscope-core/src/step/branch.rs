//! Branch step: first matching rule picks the next step.
//!
//! Metric rules compare `context.metrics` values; breakdown rules scan an
//! evidence list and record the first matching entry under
//! `scratch.matched_breakdown`.

use dropscope_types::context::AnalysisContext;
use dropscope_types::insight::MATCHED_BREAKDOWN_KEY;
use dropscope_types::step::{StepDelta, StepResult};
use dropscope_types::workflow::{
    BranchConfig, BranchRule, BreakdownMatch, CompareOp, Condition, StepDefinition,
};
use serde_json::{Map, Value};

pub(crate) fn run(step: &StepDefinition, cfg: &BranchConfig, ctx: &AnalysisContext) -> StepResult {
    for (idx, rule) in cfg.rules.iter().enumerate() {
        if !metric_rule_matches(rule, ctx) {
            continue;
        }

        let delta = match &rule.any_in_breakdowns {
            None => None,
            Some(matcher) => match find_breakdown_match(matcher, ctx) {
                Some(matched) => {
                    let mut scratch = Map::new();
                    scratch.insert(MATCHED_BREAKDOWN_KEY.to_string(), matched);
                    Some(StepDelta::with_scratch(scratch))
                }
                None => continue,
            },
        };

        tracing::debug!(step_id = %step.id, rule = idx, then = ?rule.then, "branch rule matched");
        return StepResult::pass(delta, rule.then.clone());
    }

    match cfg.fallback.as_ref().and_then(|route| route.then.clone()) {
        Some(then) => {
            tracing::debug!(step_id = %step.id, then = %then, "branch default taken");
            StepResult::pass(None, Some(then))
        }
        None => StepResult::fail("no rule matched and no default path defined"),
    }
}

/// `all` needs every condition, `any` needs one; absent or empty lists match.
fn metric_rule_matches(rule: &BranchRule, ctx: &AnalysisContext) -> bool {
    let all = rule.all.as_deref().unwrap_or_default();
    let any = rule.any.as_deref().unwrap_or_default();

    let all_ok = all.iter().all(|c| metric_condition(c, ctx));
    let any_ok = any.is_empty() || any.iter().any(|c| metric_condition(c, ctx));
    all_ok && any_ok
}

fn metric_condition(condition: &Condition, ctx: &AnalysisContext) -> bool {
    match ctx.metric(&condition.metric) {
        Some(value) => compare(&value.to_json(), condition.op, &condition.value),
        None => false,
    }
}

/// First entry (within `limit`) matching every condition, as JSON.
fn find_breakdown_match(matcher: &BreakdownMatch, ctx: &AnalysisContext) -> Option<Value> {
    let entries = ctx.breakdowns.get(&matcher.dimension)?;
    let limit = matcher.limit.unwrap_or(entries.len());

    entries.iter().take(limit).find_map(|entry| {
        let fields = serde_json::to_value(entry).ok()?;
        matcher.conditions
            .iter()
            .all(|c| {
                resolve_field(&fields, &c.metric)
                    .is_some_and(|left| compare(left, c.op, &c.value))
            })
            .then_some(fields)
    })
}

/// Look a field up in `deltas`, then `current`, then `baseline`, then the
/// entry itself.
fn resolve_field<'a>(fields: &'a Value, name: &str) -> Option<&'a Value> {
    ["deltas", "current", "baseline"]
        .iter()
        .filter_map(|section| fields.get(section)?.get(name))
        .next()
        .or_else(|| fields.get(name))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Numeric comparison when both sides parse as numbers; otherwise only
/// `==` / `!=` apply, on the raw values.
fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    if let (Some(l), Some(r)) = (as_number(left), as_number(right)) {
        return match op {
            CompareOp::Gt => l > r,
            CompareOp::Gte => l >= r,
            CompareOp::Lt => l < r,
            CompareOp::Lte => l <= r,
            CompareOp::Eq => l == r,
            CompareOp::Ne => l != r,
        };
    }
    match op {
        CompareOp::Eq => left == right,
        CompareOp::Ne => left != right,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
