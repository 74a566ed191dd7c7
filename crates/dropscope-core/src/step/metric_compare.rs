//! Metric comparison step: current vs. baseline totals and their deltas.

use dropscope_types::context::{AnalysisContext, MetricValue, Metrics};
use dropscope_types::step::{StepDelta, StepResult};
use dropscope_types::workflow::{MetricCompareConfig, StepDefinition};

use super::StepError;
use crate::scoring::{pct_change, rate, rate_change};
use crate::source::{AnalyticsSource, MetricQuery};

pub(crate) async fn run<S: AnalyticsSource>(
    source: &S,
    step: &StepDefinition,
    cfg: &MetricCompareConfig,
    ctx: &AnalysisContext,
) -> Result<StepResult, StepError> {
    let Some(meta) = &ctx.meta else {
        return Ok(StepResult::fail("metric comparison: missing meta in context"));
    };
    let query = match MetricQuery::from_meta(meta, &cfg.metrics) {
        Ok(query) => query,
        Err(e) => return Ok(StepResult::fail(format!("metric comparison: {e}"))),
    };

    let Some(row) = source.metric_totals(&query).await? else {
        return Ok(StepResult::fail(
            "metric comparison: missing current or baseline data",
        ));
    };

    if row.current_sessions == 0 || row.baseline_sessions == 0 {
        return Ok(StepResult::fail(
            "metric comparison: sessions count is zero, cannot compute CVR",
        ));
    }

    let current_cvr = rate(row.current_orders, row.current_sessions);
    let baseline_cvr = rate(row.baseline_orders, row.baseline_sessions);
    let current_atc_rate = rate(row.current_atc_sessions, row.current_sessions);
    let baseline_atc_rate = rate(row.baseline_atc_sessions, row.baseline_sessions);

    let cvr_delta_pct = rate_change(current_cvr, baseline_cvr);
    let atc_rate_delta_pct = rate_change(current_atc_rate, baseline_atc_rate);
    let orders_delta_pct = pct_change(row.current_orders as f64, row.baseline_orders as f64);
    let sessions_delta_pct = pct_change(row.current_sessions as f64, row.baseline_sessions as f64);

    tracing::debug!(
        step_id = %step.id,
        current_sessions = row.current_sessions,
        baseline_sessions = row.baseline_sessions,
        cvr_delta_pct = ?cvr_delta_pct,
        "metric comparison computed"
    );

    let metrics: Metrics = [
        ("current_orders", MetricValue::from(row.current_orders)),
        ("baseline_orders", MetricValue::from(row.baseline_orders)),
        ("current_sessions", MetricValue::from(row.current_sessions)),
        ("baseline_sessions", MetricValue::from(row.baseline_sessions)),
        ("current_atc_sessions", MetricValue::from(row.current_atc_sessions)),
        ("baseline_atc_sessions", MetricValue::from(row.baseline_atc_sessions)),
        ("current_cvr", MetricValue::from(current_cvr)),
        ("baseline_cvr", MetricValue::from(baseline_cvr)),
        ("current_atc_rate", MetricValue::from(current_atc_rate)),
        ("baseline_atc_rate", MetricValue::from(baseline_atc_rate)),
        ("orders_delta_pct", MetricValue::from(orders_delta_pct)),
        ("sessions_delta_pct", MetricValue::from(sessions_delta_pct)),
        ("cvr_delta_pct", MetricValue::from(cvr_delta_pct)),
        ("atc_rate_delta_pct", MetricValue::from(atc_rate_delta_pct)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    Ok(StepResult::pass(
        Some(StepDelta::with_metrics(metrics)),
        step.next.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dropscope_types::analytics::MetricTotalsRow;
    use dropscope_types::context::{RunMeta, TimeWindow, window_time};
    use dropscope_types::step::StepStatus;
    use dropscope_types::workflow::StepConfig;

    use crate::source::StaticSource;

    fn step() -> (StepDefinition, MetricCompareConfig) {
        let cfg = MetricCompareConfig {
            metrics: vec!["cvr".to_string()],
        };
        let step = StepDefinition {
            id: "compare".to_string(),
            config: StepConfig::MetricCompare(cfg.clone()),
            next: Some("breakdown".to_string()),
            on_fail: None,
        };
        (step, cfg)
    }

    fn context() -> AnalysisContext {
        let w = |s: &str, e: &str| {
            TimeWindow::new(window_time::parse(s).unwrap(), window_time::parse(e).unwrap())
        };
        AnalysisContext::new(RunMeta::new(
            "TMC",
            "cvr",
            w("2026-01-18 00:00:00", "2026-01-19 00:00:00"),
            w("2026-01-17 00:00:00", "2026-01-18 00:00:00"),
        ))
    }

    #[tokio::test]
    async fn test_computes_rates_and_deltas() {
        let source = StaticSource::new().with_totals(MetricTotalsRow {
            current_sessions: 1000,
            baseline_sessions: 1000,
            current_atc_sessions: 150,
            baseline_atc_sessions: 200,
            current_orders: 40,
            baseline_orders: 50,
        });
        let (step, cfg) = step();
        let result = run(&source, &step, &cfg, &context()).await.unwrap();
        assert_eq!(result.status, StepStatus::Pass);
        assert_eq!(result.next.as_deref(), Some("breakdown"));

        let m = result.delta.unwrap().metrics.unwrap();
        assert_eq!(m["current_cvr"], MetricValue::Number(0.04));
        assert_eq!(m["baseline_cvr"], MetricValue::Number(0.05));
        assert!((m["orders_delta_pct"].as_f64().unwrap() + 20.0).abs() < 1e-9);
        assert_eq!(m["sessions_delta_pct"], MetricValue::Number(0.0));
        assert!((m["cvr_delta_pct"].as_f64().unwrap() + 20.0).abs() < 1e-9);
        assert!((m["atc_rate_delta_pct"].as_f64().unwrap() + 25.0).abs() < 1e-9);
        assert_eq!(m["current_atc_sessions"], MetricValue::Number(150.0));
    }

    #[tokio::test]
    async fn test_zero_baseline_orders_gives_null_deltas() {
        let source = StaticSource::new().with_totals(MetricTotalsRow {
            current_sessions: 100,
            baseline_sessions: 100,
            current_orders: 3,
            baseline_orders: 0,
            ..Default::default()
        });
        let (step, cfg) = step();
        let m = run(&source, &step, &cfg, &context())
            .await
            .unwrap()
            .delta
            .unwrap()
            .metrics
            .unwrap();
        assert!(m["orders_delta_pct"].is_missing());
        assert!(m["cvr_delta_pct"].is_missing());
        assert!(m["atc_rate_delta_pct"].is_missing());
    }

    #[tokio::test]
    async fn test_fails_without_data_or_sessions() {
        let (step, cfg) = step();
        let result = run(&StaticSource::new(), &step, &cfg, &context())
            .await
            .unwrap();
        assert!(result.reason.unwrap().contains("missing current or baseline"));

        let source = StaticSource::new().with_totals(MetricTotalsRow {
            current_sessions: 0,
            baseline_sessions: 100,
            ..Default::default()
        });
        let result = run(&source, &step, &cfg, &context()).await.unwrap();
        assert!(result.reason.unwrap().contains("sessions count is zero"));
    }

    #[tokio::test]
    async fn test_incomplete_baseline_fails() {
        let mut ctx = context();
        if let Some(meta) = ctx.meta.as_mut() {
            meta.baseline_window = None;
        }
        let (step, cfg) = step();
        let result = run(&StaticSource::new(), &step, &cfg, &ctx).await.unwrap();
        assert!(result.is_failure());
        assert!(result.reason.unwrap().contains("baseline window"));
    }
}
