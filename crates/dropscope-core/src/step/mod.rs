//! Step behaviors for all 6 workflow step types.
//!
//! `StepRunner` dispatches execution to the appropriate handler based on
//! the `StepConfig` variant. Each handler reads the analysis context, may
//! query the analytics source, and returns a `StepResult` whose delta the
//! caller merges.
//!
//! Step types: Validation, MetricCompare, Branch, RecursiveDimensionBreakdown,
//! Composite, Insight.

mod branch;
mod breakdown;
mod composite;
mod insight;
mod metric_compare;
mod validation;

use std::sync::Arc;

use dropscope_types::context::AnalysisContext;
use dropscope_types::error::SourceError;
use dropscope_types::step::StepResult;
use dropscope_types::workflow::{StepConfig, StepDefinition};

use crate::definition::StepRegistry;
use crate::merge::MergeError;
use crate::source::AnalyticsSource;

pub use insight::{confidence, render_template};

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

/// Infrastructure failures inside a step.
///
/// Business-rule failures are `StepResult::fail` values, not errors.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Source(#[from] SourceError),

    /// A composite sub-step's delta could not be merged.
    #[error(transparent)]
    Merge(#[from] MergeError),
}

// ---------------------------------------------------------------------------
// StepRunner
// ---------------------------------------------------------------------------

/// Executes individual workflow steps by dispatching to type-specific handlers.
pub struct StepRunner<S> {
    source: Arc<S>,
}

impl<S: AnalyticsSource> StepRunner<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }

    /// Run a step against the shared context.
    ///
    /// Only composite steps write to `ctx` directly (each sub-step's delta is
    /// merged as it completes); every other step leaves merging to the caller.
    pub async fn run(
        &self,
        step: &StepDefinition,
        ctx: &mut AnalysisContext,
        registry: &StepRegistry,
    ) -> Result<StepResult, StepError> {
        match &step.config {
            StepConfig::Composite(cfg) => composite::run(self, step, cfg, ctx, registry).await,
            _ => self.run_leaf(step, ctx).await,
        }
    }

    /// Run a non-composite step; composite steps fail here.
    pub(crate) async fn run_leaf(
        &self,
        step: &StepDefinition,
        ctx: &AnalysisContext,
    ) -> Result<StepResult, StepError> {
        tracing::debug!(step_id = %step.id, step_type = step.step_type(), "running step");
        match &step.config {
            StepConfig::Validation(_) => Ok(validation::run(step, ctx)),
            StepConfig::MetricCompare(cfg) => {
                metric_compare::run(self.source.as_ref(), step, cfg, ctx).await
            }
            StepConfig::Branch(cfg) => Ok(branch::run(step, cfg, ctx)),
            StepConfig::RecursiveDimensionBreakdown(cfg) => {
                breakdown::run(self.source.as_ref(), step, cfg, ctx).await
            }
            StepConfig::Insight(cfg) => Ok(insight::run(step, cfg, ctx)),
            StepConfig::Composite(_) => Ok(StepResult::fail(format!(
                "composite step '{}' cannot run inside another composite",
                step.id
            ))),
        }
    }
}
