//! Composite step: runs a fixed list of steps against the shared context.
//!
//! Each sub-step's delta is merged into the live context as soon as it
//! completes (so the next sub-step observes it) and folded into a local
//! accumulator that becomes the composite's own delta. The accumulator
//! starts with an empty scratch, so unless a sub-step writes scratch the
//! runner's merge of the composite delta clears it.

use dropscope_types::context::AnalysisContext;
use dropscope_types::step::{StepDelta, StepResult};
use serde_json::Map;
use dropscope_types::workflow::{CompositeConfig, StepDefinition};

use super::{StepError, StepRunner};
use crate::definition::StepRegistry;
use crate::merge::{absorb, merge};
use crate::source::AnalyticsSource;

pub(crate) async fn run<S: AnalyticsSource>(
    runner: &StepRunner<S>,
    step: &StepDefinition,
    cfg: &CompositeConfig,
    ctx: &mut AnalysisContext,
    registry: &StepRegistry,
) -> Result<StepResult, StepError> {
    if cfg.steps.is_empty() {
        return Ok(StepResult::fail("composite: steps must be a non-empty list"));
    }

    let mut combined = StepDelta {
        scratch: Some(Map::new()),
        ..Default::default()
    };

    for sub_id in &cfg.steps {
        let Some(sub) = registry.get(sub_id) else {
            return Ok(StepResult::fail(format!(
                "composite: step not found: {sub_id}"
            )));
        };

        let result = runner.run_leaf(sub, ctx).await?;

        if result.is_failure() {
            // The sub-step's own terminate reason wins over its raw reason.
            let reason = sub
                .on_fail
                .as_ref()
                .filter(|_| sub.terminates_on_fail())
                .and_then(|policy| policy.reason.clone())
                .or(result.reason)
                .unwrap_or_else(|| format!("composite: step '{sub_id}' failed"));
            tracing::debug!(step_id = %step.id, sub_step = %sub_id, %reason, "composite sub-step failed");
            return Ok(StepResult::fail(reason));
        }

        if let Some(delta) = &result.delta {
            merge(ctx, Some(delta))?;
            absorb(&mut combined, delta)?;
        }
    }

    Ok(StepResult::pass(Some(combined), step.next.clone()))
}
