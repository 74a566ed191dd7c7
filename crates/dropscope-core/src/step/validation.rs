//! Validation step: checks run meta before any data is fetched.

use dropscope_types::context::{AnalysisContext, MetricValue, Metrics};
use dropscope_types::step::{StepDelta, StepResult};
use dropscope_types::workflow::StepDefinition;

pub(crate) fn run(step: &StepDefinition, ctx: &AnalysisContext) -> StepResult {
    let Some(meta) = &ctx.meta else {
        return StepResult::fail("missing meta in context");
    };

    if meta.tenant_id.trim().is_empty() {
        return StepResult::fail("invalid or missing tenantId in context.meta");
    }
    if meta.metric.trim().is_empty() {
        return StepResult::fail("invalid or missing metric in context.meta");
    }
    if !meta.window.is_some_and(|w| w.is_complete()) {
        return StepResult::fail("invalid or missing window in context.meta");
    }

    let baseline_available = meta.baseline_window.is_some_and(|w| w.is_complete());

    let metrics = Metrics::from([
        ("data_valid".to_string(), MetricValue::Flag(true)),
        (
            "baseline_available".to_string(),
            MetricValue::Flag(baseline_available),
        ),
    ]);
    StepResult::pass(Some(StepDelta::with_metrics(metrics)), step.next.clone())
}
