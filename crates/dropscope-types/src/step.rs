//! Step results and the partial context deltas steps return.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::{Breakdowns, Filter, Metrics, RunMeta};

/// Outcome of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pass,
    Fail,
    Terminated,
}

/// A partial `AnalysisContext` fragment.
///
/// Every field is optional; absent fields leave the context untouched. See
/// `dropscope-core::merge` for the per-field rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDelta {
    /// Never accepted by merge; present so the rejection is observable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<RunMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<Filter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause_path: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdowns: Option<Breakdowns>,
}

impl StepDelta {
    pub fn with_metrics(metrics: Metrics) -> Self {
        Self {
            metrics: Some(metrics),
            ..Default::default()
        }
    }

    pub fn with_scratch(scratch: Map<String, Value>) -> Self {
        Self {
            scratch: Some(scratch),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_none()
            && self.filters.is_none()
            && self.metrics.is_none()
            && self.root_cause_path.is_none()
            && self.scratch.is_none()
            && self.breakdowns.is_none()
    }
}

/// What a step hands back to the runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<StepDelta>,
    /// Step to run next; `None` completes the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    /// Human-readable reason, always set on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StepResult {
    pub fn pass(delta: Option<StepDelta>, next: Option<String>) -> Self {
        Self {
            status: StepStatus::Pass,
            delta,
            next,
            reason: None,
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Fail,
            delta: None,
            next: None,
            reason: Some(reason.into()),
        }
    }

    /// `Fail` and `Terminated` both count as failures for the runner.
    pub fn is_failure(&self) -> bool {
        self.status != StepStatus::Pass
    }
}
