//! Workflow runner: walks a definition's `next` pointers over one context.
//!
//! # Execution flow
//!
//! 1. Build the step registry (duplicate ids and empty workflows are fatal).
//! 2. Start at the first declared step.
//! 3. For each step: guard the dispatch ceiling and the visited set, append a
//!    trace entry, dispatch, then apply the failure policy or merge the delta.
//! 4. Stop when a step returns no `next` (completed) or a failing step's
//!    policy terminates the run.
//!
//! Execution is strictly sequential; the only suspension points are the
//! data-source calls inside steps.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use dropscope_types::context::{AnalysisContext, TraceEntry};
use dropscope_types::step::{StepResult, StepStatus};
use dropscope_types::workflow::WorkflowDefinition;
use serde::Serialize;
use uuid::Uuid;

use crate::definition::{GraphError, StepRegistry};
use crate::merge::{MergeError, merge};
use crate::source::AnalyticsSource;
use crate::step::{StepError, StepRunner};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum number of top-level step dispatches per run.
pub const MAX_DISPATCHED_STEPS: usize = 100;

// ---------------------------------------------------------------------------
// RunOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// A step returned no `next` pointer.
    Completed,
    /// A step failed under an `on_fail: terminate` policy.
    Terminated,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Completed => f.write_str("completed"),
            RunStatus::Terminated => f.write_str("terminated"),
        }
    }
}

/// What one dispatched step returned, kept for run history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub step_id: String,
    pub step_type: &'static str,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StepRecord {
    fn new(step_id: &str, step_type: &'static str, result: &StepResult) -> Self {
        Self {
            step_id: step_id.to_string(),
            step_type,
            status: result.status,
            next: result.next.clone(),
            reason: result.reason.clone(),
        }
    }
}

/// Terminal outcome of a run that did not raise.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub status: RunStatus,
    /// Set when the run was terminated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub context: AnalysisContext,
    pub steps: Vec<StepRecord>,
}

// ---------------------------------------------------------------------------
// RunError
// ---------------------------------------------------------------------------

/// Fatal run outcomes, propagated to the caller instead of returned.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("missing initial context: meta is required")]
    MissingContext,

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    ImmutableField(#[from] MergeError),

    /// A step failed and its policy does not terminate the run.
    #[error("step '{step_id}' failed: {reason}")]
    StepFailed { step_id: String, reason: String },

    /// Infrastructure failure inside a step.
    #[error("step '{step_id}' errored: {source}")]
    Step {
        step_id: String,
        #[source]
        source: StepError,
    },
}

// ---------------------------------------------------------------------------
// WorkflowRunner
// ---------------------------------------------------------------------------

/// Interprets one workflow definition; reusable across runs.
///
/// Generic over `S: AnalyticsSource` so tests can run against canned rows.
pub struct WorkflowRunner<S> {
    definition: WorkflowDefinition,
    registry: StepRegistry,
    steps: StepRunner<S>,
}

impl<S: AnalyticsSource> WorkflowRunner<S> {
    pub fn new(definition: WorkflowDefinition, source: Arc<S>) -> Result<Self, GraphError> {
        let registry = StepRegistry::build(&definition)?;
        Ok(Self {
            definition,
            registry,
            steps: StepRunner::new(source),
        })
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    /// Run the workflow against `ctx`, which the run owns until it returns.
    pub async fn run(&self, mut ctx: AnalysisContext) -> Result<RunOutcome, RunError> {
        if ctx.meta.is_none() {
            return Err(RunError::MissingContext);
        }

        let run_id = Uuid::now_v7();
        let mut visited: HashSet<String> = HashSet::new();
        let mut records: Vec<StepRecord> = Vec::new();
        let mut pointer = self.definition.entry_step().map(str::to_string);

        tracing::info!(
            %run_id,
            workflow_id = %self.definition.id,
            version = %self.definition.version,
            steps = self.registry.len(),
            "workflow run started"
        );

        while let Some(step_id) = pointer.take() {
            if records.len() >= MAX_DISPATCHED_STEPS {
                return Err(GraphError::StepLimitExceeded {
                    limit: MAX_DISPATCHED_STEPS,
                }
                .into());
            }
            if !visited.insert(step_id.clone()) {
                return Err(GraphError::CycleDetected(step_id).into());
            }
            let step = self
                .registry
                .get(&step_id)
                .ok_or_else(|| GraphError::StepNotFound(step_id.clone()))?;

            ctx.execution_trace.push(TraceEntry {
                step_id: step.id.clone(),
                step_type: step.step_type().to_string(),
                timestamp: Utc::now(),
            });
            tracing::debug!(%run_id, step_id = %step.id, step_type = step.step_type(), "dispatching step");

            let result = self
                .steps
                .run(step, &mut ctx, &self.registry)
                .await
                .map_err(|source| RunError::Step {
                    step_id: step.id.clone(),
                    source,
                })?;
            records.push(StepRecord::new(&step.id, step.step_type(), &result));

            if result.is_failure() {
                let reason = result
                    .reason
                    .clone()
                    .unwrap_or_else(|| format!("step '{}' failed", step.id));

                if !step.terminates_on_fail() {
                    tracing::warn!(%run_id, step_id = %step.id, %reason, "step failed without terminate policy");
                    return Err(RunError::StepFailed {
                        step_id: step.id.clone(),
                        reason,
                    });
                }

                let reason = step
                    .on_fail
                    .as_ref()
                    .and_then(|policy| policy.reason.clone())
                    .unwrap_or(reason);
                tracing::warn!(%run_id, step_id = %step.id, %reason, "workflow run terminated");
                return Ok(RunOutcome {
                    run_id,
                    status: RunStatus::Terminated,
                    reason: Some(reason),
                    context: ctx,
                    steps: records,
                });
            }

            merge(&mut ctx, result.delta.as_ref())?;
            pointer = result.next;
        }

        tracing::info!(%run_id, dispatched = records.len(), "workflow run completed");
        Ok(RunOutcome {
            run_id,
            status: RunStatus::Completed,
            reason: None,
            context: ctx,
            steps: records,
        })
    }
}

/// Build a runner for `definition` and run it once.
pub async fn run_workflow<S: AnalyticsSource>(
    definition: WorkflowDefinition,
    ctx: AnalysisContext,
    source: Arc<S>,
) -> Result<RunOutcome, RunError> {
    WorkflowRunner::new(definition, source)?.run(ctx).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
