//! Context merge: applies a step's partial delta to the analysis context.
//!
//! Per-field rules:
//! - `meta` -- immutable; any attempt to merge it is rejected before anything else
//! - `filters`, `rootCausePath` -- appended in order
//! - `metrics` -- shallow merge, delta wins key by key
//! - `scratch` -- replaced wholesale
//! - `breakdowns` -- appended per key, never deduplicated

use dropscope_types::context::AnalysisContext;
use dropscope_types::step::StepDelta;

/// Errors raised by context merge.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("{0} is immutable and cannot be merged")]
    ImmutableField(&'static str),
}

/// Apply `delta` to `ctx` in place.
///
/// `None` or an empty delta leaves the context unchanged.
pub fn merge(ctx: &mut AnalysisContext, delta: Option<&StepDelta>) -> Result<(), MergeError> {
    let Some(delta) = delta else {
        return Ok(());
    };

    if delta.meta.is_some() {
        return Err(MergeError::ImmutableField("meta"));
    }

    if let Some(filters) = &delta.filters {
        ctx.filters.extend(filters.iter().cloned());
    }

    if let Some(metrics) = &delta.metrics {
        for (key, value) in metrics {
            ctx.metrics.insert(key.clone(), value.clone());
        }
    }

    if let Some(path) = &delta.root_cause_path {
        ctx.root_cause_path.extend(path.iter().cloned());
    }

    if let Some(scratch) = &delta.scratch {
        ctx.scratch = scratch.clone();
    }

    if let Some(breakdowns) = &delta.breakdowns {
        for (key, entries) in breakdowns {
            ctx.breakdowns
                .entry(key.clone())
                .or_default()
                .extend(entries.iter().cloned());
        }
    }

    Ok(())
}

/// Fold `delta` into an accumulating delta with the same rules as [`merge`].
///
/// Used by composite steps to build their combined delta.
pub fn absorb(acc: &mut StepDelta, delta: &StepDelta) -> Result<(), MergeError> {
    if delta.meta.is_some() {
        return Err(MergeError::ImmutableField("meta"));
    }

    if let Some(filters) = &delta.filters {
        acc.filters
            .get_or_insert_with(Vec::new)
            .extend(filters.iter().cloned());
    }

    if let Some(metrics) = &delta.metrics {
        let target = acc.metrics.get_or_insert_with(Default::default);
        for (key, value) in metrics {
            target.insert(key.clone(), value.clone());
        }
    }

    if let Some(path) = &delta.root_cause_path {
        acc.root_cause_path
            .get_or_insert_with(Vec::new)
            .extend(path.iter().cloned());
    }

    if let Some(scratch) = &delta.scratch {
        acc.scratch = Some(scratch.clone());
    }

    if let Some(breakdowns) = &delta.breakdowns {
        let target = acc.breakdowns.get_or_insert_with(Default::default);
        for (key, entries) in breakdowns {
            target
                .entry(key.clone())
                .or_default()
                .extend(entries.iter().cloned());
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use dropscope_types::context::{Filter, MetricValue, Metrics, RunMeta};
    use dropscope_types::evidence::Evidence;
    use dropscope_types::workflow::BaseMetric;
    use serde_json::{json, Map};

    fn test_context() -> AnalysisContext {
        let mut ctx = AnalysisContext::new(RunMeta {
            tenant_id: "TMC".to_string(),
            metric: "cvr".to_string(),
            ..Default::default()
        });
        ctx.metrics.insert("cvr_delta_pct".to_string(), MetricValue::Number(-10.0));
        ctx.filters.push(Filter::new("utm_source", "google"));
        ctx.scratch.insert("note".to_string(), json!("keep me?"));
        ctx
    }

    fn evidence(value: &str) -> Evidence {
        Evidence {
            dimension: "utm_source".to_string(),
            value: value.to_string(),
            display_value: value.to_string(),
            depth: 0,
            current: Default::default(),
            baseline: Default::default(),
            deltas: Default::default(),
            session_share: 0.5,
            order_share: 0.5,
            baseline_session_share: 0.5,
            baseline_order_share: 0.5,
            base_metric: BaseMetric::Cvr,
        }
    }

    fn breakdown_delta(values: &[&str]) -> StepDelta {
        let mut breakdowns = dropscope_types::context::Breakdowns::new();
        breakdowns.insert(
            "utm_source".to_string(),
            values.iter().map(|v| evidence(v)).collect(),
        );
        StepDelta {
            breakdowns: Some(breakdowns),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_delta_is_noop() {
        let mut ctx = test_context();
        let before = ctx.clone();
        merge(&mut ctx, Some(&StepDelta::default())).unwrap();
        assert_eq!(ctx, before);
        merge(&mut ctx, None).unwrap();
        assert_eq!(ctx, before);
    }

    #[test]
    fn test_meta_is_rejected() {
        let mut ctx = test_context();
        let before = ctx.clone();
        let delta = StepDelta {
            meta: Some(RunMeta::default()),
            metrics: Some(Metrics::from([("x".to_string(), MetricValue::Number(1.0))])),
            ..Default::default()
        };
        let err = merge(&mut ctx, Some(&delta)).unwrap_err();
        assert!(matches!(err, MergeError::ImmutableField("meta")));
        // Nothing else applied
        assert_eq!(ctx, before);
    }

    #[test]
    fn test_filters_and_path_append() {
        let mut ctx = test_context();
        let delta = StepDelta {
            filters: Some(vec![
                Filter::new("landing_page_path", "/sale"),
                Filter::new("product_id", "42"),
            ]),
            root_cause_path: Some(vec![json!("utm_source=google")]),
            ..Default::default()
        };
        merge(&mut ctx, Some(&delta)).unwrap();
        merge(&mut ctx, Some(&delta)).unwrap();
        assert_eq!(ctx.filters.len(), 5);
        assert_eq!(ctx.filters[1].dimension, "landing_page_path");
        assert_eq!(ctx.root_cause_path.len(), 2);
    }

    #[test]
    fn test_metrics_shallow_merge_delta_wins() {
        let mut ctx = test_context();
        let delta = StepDelta::with_metrics(Metrics::from([
            ("cvr_delta_pct".to_string(), MetricValue::Number(-25.0)),
            ("data_valid".to_string(), MetricValue::Flag(true)),
        ]));
        merge(&mut ctx, Some(&delta)).unwrap();
        assert_eq!(ctx.metric_f64("cvr_delta_pct"), Some(-25.0));
        assert_eq!(ctx.metric("data_valid"), Some(&MetricValue::Flag(true)));
    }

    #[test]
    fn test_scratch_replaced_wholesale() {
        let mut ctx = test_context();
        let mut scratch = Map::new();
        scratch.insert("final_insight".to_string(), json!({"summary": "x"}));
        merge(&mut ctx, Some(&StepDelta::with_scratch(scratch))).unwrap();
        assert!(ctx.scratch.get("note").is_none());
        assert!(ctx.scratch.get("final_insight").is_some());
    }

    #[test]
    fn test_breakdowns_append_without_dedup() {
        let mut ctx = test_context();
        merge(&mut ctx, Some(&breakdown_delta(&["google", "meta"]))).unwrap();
        merge(&mut ctx, Some(&breakdown_delta(&["google"]))).unwrap();
        let list = &ctx.breakdowns["utm_source"];
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].value, "google");
        assert_eq!(list[2].value, "google");
    }

    #[test]
    fn test_absorb_matches_merge_rules() {
        let mut acc = StepDelta::default();
        absorb(&mut acc, &breakdown_delta(&["google"])).unwrap();
        absorb(&mut acc, &breakdown_delta(&["meta"])).unwrap();
        absorb(
            &mut acc,
            &StepDelta::with_metrics(Metrics::from([("a".to_string(), MetricValue::Number(1.0))])),
        )
        .unwrap();
        absorb(
            &mut acc,
            &StepDelta::with_metrics(Metrics::from([("a".to_string(), MetricValue::Number(2.0))])),
        )
        .unwrap();

        assert_eq!(acc.breakdowns.as_ref().unwrap()["utm_source"].len(), 2);
        assert_eq!(acc.metrics.as_ref().unwrap()["a"], MetricValue::Number(2.0));
        assert!(acc.scratch.is_none());

        let err = absorb(
            &mut acc,
            &StepDelta {
                meta: Some(RunMeta::default()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("immutable"));
    }
}
