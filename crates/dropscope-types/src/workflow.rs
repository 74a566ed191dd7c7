//! Workflow definition types for DropScope.
//!
//! A `WorkflowDefinition` is the canonical, immutable description of a root
//! cause analysis: an ordered list of steps linked by `next` pointers (and by
//! branch `then` targets). Each step carries a type tag and a type-specific
//! configuration payload.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Workflow Definition
// ---------------------------------------------------------------------------

/// The canonical workflow definition.
///
/// JSON and YAML files both deserialize into this struct. The legacy
/// `workflow_id` / `nodes` keys are accepted as aliases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow identifier (e.g. "cvr-drop").
    #[serde(alias = "workflow_id")]
    pub id: String,
    /// Version label (e.g. "v3").
    pub version: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ordered steps. Execution starts at the first one.
    #[serde(alias = "nodes")]
    pub steps: Vec<StepDefinition>,
    /// Extensible metadata (workflow_type, owner, ...).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl WorkflowDefinition {
    /// The id of the step execution starts from.
    pub fn entry_step(&self) -> Option<&str> {
        self.steps.first().map(|s| s.id.as_str())
    }
}

// ---------------------------------------------------------------------------
// Step Definition
// ---------------------------------------------------------------------------

/// Every recognized step type tag.
pub const STEP_TYPES: [&str; 6] = [
    "validation",
    "metric_compare",
    "branch",
    "recursive_dimension_breakdown",
    "composite",
    "insight",
];

/// A single step in a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Step ID, unique within the workflow.
    pub id: String,
    /// Step-specific configuration, tagged by `type`.
    #[serde(flatten)]
    pub config: StepConfig,
    /// Step to run after this one passes. Absent means the run completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    /// What to do when the step fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_fail: Option<OnFailPolicy>,
}

impl StepDefinition {
    /// The type tag of this step.
    pub fn step_type(&self) -> &'static str {
        self.config.type_name()
    }

    /// Whether a failure of this step should end the run cleanly.
    pub fn terminates_on_fail(&self) -> bool {
        self.on_fail
            .as_ref()
            .is_some_and(|p| p.action == OnFailAction::Terminate)
    }
}

/// Failure policy attached to a step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OnFailPolicy {
    pub action: OnFailAction,
    /// Replaces the step's own failure reason when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFailAction {
    Terminate,
    /// Escalate to a fatal run error (the default when no policy is set).
    Raise,
}

/// Step-specific configuration payload, internally tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepConfig {
    Validation(ValidationConfig),
    MetricCompare(MetricCompareConfig),
    Branch(BranchConfig),
    RecursiveDimensionBreakdown(BreakdownConfig),
    Composite(CompositeConfig),
    Insight(InsightConfig),
}

impl StepConfig {
    pub fn type_name(&self) -> &'static str {
        match self {
            StepConfig::Validation(_) => "validation",
            StepConfig::MetricCompare(_) => "metric_compare",
            StepConfig::Branch(_) => "branch",
            StepConfig::RecursiveDimensionBreakdown(_) => "recursive_dimension_breakdown",
            StepConfig::Composite(_) => "composite",
            StepConfig::Insight(_) => "insight",
        }
    }
}

// ---------------------------------------------------------------------------
// Validation / MetricCompare
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Informational check labels (e.g. "tenant", "window").
    #[serde(default)]
    pub checks: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricCompareConfig {
    /// Metric names requested from the data source (e.g. ["cvr", "orders"]).
    #[serde(default)]
    pub metrics: Vec<String>,
}

// ---------------------------------------------------------------------------
// Branch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BranchConfig {
    /// Rules evaluated in declared order; the first match wins.
    #[serde(default)]
    pub rules: Vec<BranchRule>,
    /// Route taken when no rule matches.
    #[serde(default, rename = "default", skip_serializing_if = "Option::is_none")]
    pub fallback: Option<BranchRoute>,
}

/// A branch rule: either a metric rule (`all` / `any`) or a breakdown rule
/// (`any_in_breakdowns`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BranchRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all: Option<Vec<Condition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub any: Option<Vec<Condition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub any_in_breakdowns: Option<BreakdownMatch>,
    /// Step to jump to when the rule matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub then: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchRoute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub then: Option<String>,
}

/// Scan of `context.breakdowns[dimension]` for an entry matching every condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakdownMatch {
    pub dimension: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Only the first `limit` entries are scanned when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// `{metric, op, value}` comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub metric: String,
    pub op: CompareOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Recursive Dimension Breakdown
// ---------------------------------------------------------------------------

/// Dimensions a breakdown may slice by.
pub const ALLOWED_DIMENSIONS: [&str; 9] = [
    "product_id",
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_content",
    "utm_term",
    "landing_page_path",
    "landing_page_type",
    "referrer_name",
];

/// The dimension whose rows carry a display title.
pub const PRODUCT_DIMENSION: &str = "product_id";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BreakdownConfig {
    /// Single dimension (used when `dimensions` is empty).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<String>,
    /// One dimension per recursion depth.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub base_metric: BaseMetric,
    #[serde(default)]
    pub stop_conditions: StopConditions,
    #[serde(default)]
    pub rank_by: RankBy,
    #[serde(default)]
    pub rank_order: RankOrder,
    #[serde(default)]
    pub filter_mode: FilterMode,
    #[serde(default)]
    pub min_sessions_mode: MinSessionsMode,
    /// Names the published breakdown and ranked-list metric.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
}

impl BreakdownConfig {
    /// Dimension per depth: `dimensions` when non-empty, else `[dimension]`.
    pub fn dimension_list(&self) -> Vec<String> {
        if !self.dimensions.is_empty() {
            self.dimensions.clone()
        } else {
            self.dimension.iter().cloned().collect()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopConditions {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default)]
    pub min_sessions: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_current_sessions: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_baseline_sessions: Option<u64>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_max_depth() -> usize {
    1
}

fn default_top_k() -> usize {
    1
}

impl Default for StopConditions {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            min_sessions: 0,
            min_current_sessions: None,
            min_baseline_sessions: None,
            top_k: default_top_k(),
        }
    }
}

impl StopConditions {
    pub fn current_threshold(&self) -> u64 {
        self.min_current_sessions.unwrap_or(self.min_sessions)
    }

    pub fn baseline_threshold(&self) -> u64 {
        self.min_baseline_sessions.unwrap_or(self.min_sessions)
    }
}

/// The metric a breakdown is scored against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseMetric {
    #[default]
    Cvr,
    Orders,
    Sessions,
    AtcRate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankBy {
    #[default]
    Delta,
    BaselineCvr,
    BaselineSessions,
    BaselineOrders,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankOrder {
    #[default]
    Desc,
    Asc,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    #[default]
    Drop,
    Increase,
    All,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinSessionsMode {
    #[default]
    BothLow,
    EitherLow,
    BaselineOnly,
}

// ---------------------------------------------------------------------------
// Composite / Insight
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompositeConfig {
    /// Step ids executed in order against the shared context.
    #[serde(default)]
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsightConfig {
    #[serde(default)]
    pub template: InsightTemplate,
}

/// `{{token}}` templates rendered by the insight step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsightTemplate {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub details: Vec<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_type_tag_roundtrip() {
        let step: StepDefinition = serde_json::from_value(json!({
            "id": "compare",
            "type": "metric_compare",
            "metrics": ["cvr"],
            "next": "breakdown"
        }))
        .unwrap();
        assert_eq!(step.step_type(), "metric_compare");
        assert_eq!(step.next.as_deref(), Some("breakdown"));

        let back = serde_json::to_value(&step).unwrap();
        assert_eq!(back["type"], "metric_compare");
        assert_eq!(back["metrics"][0], "cvr");
    }

    #[test]
    fn test_breakdown_defaults() {
        let step: StepDefinition = serde_json::from_value(json!({
            "id": "by_source",
            "type": "recursive_dimension_breakdown",
            "dimension": "utm_source"
        }))
        .unwrap();
        let StepConfig::RecursiveDimensionBreakdown(cfg) = step.config else {
            panic!("expected breakdown config");
        };
        assert_eq!(cfg.base_metric, BaseMetric::Cvr);
        assert_eq!(cfg.rank_by, RankBy::Delta);
        assert_eq!(cfg.rank_order, RankOrder::Desc);
        assert_eq!(cfg.filter_mode, FilterMode::Drop);
        assert_eq!(cfg.min_sessions_mode, MinSessionsMode::BothLow);
        assert_eq!(cfg.stop_conditions.max_depth, 1);
        assert_eq!(cfg.stop_conditions.top_k, 1);
        assert_eq!(cfg.dimension_list(), vec!["utm_source"]);
    }

    #[test]
    fn test_threshold_overrides() {
        let stop: StopConditions =
            serde_json::from_value(json!({ "min_sessions": 50, "min_baseline_sessions": 200 }))
                .unwrap();
        assert_eq!(stop.current_threshold(), 50);
        assert_eq!(stop.baseline_threshold(), 200);
    }

    #[test]
    fn test_dimensions_take_precedence() {
        let cfg = BreakdownConfig {
            dimension: Some("utm_source".to_string()),
            dimensions: vec!["utm_source".to_string(), "landing_page_path".to_string()],
            ..Default::default()
        };
        assert_eq!(cfg.dimension_list().len(), 2);
    }

    #[test]
    fn test_branch_rule_shapes() {
        let step: StepDefinition = serde_json::from_value(json!({
            "id": "route",
            "type": "branch",
            "rules": [
                { "all": [{ "metric": "cvr_delta_pct", "op": "<", "value": -10 }], "then": "deep" },
                { "any_in_breakdowns": {
                    "dimension": "utm_source",
                    "conditions": [{ "metric": "sessions_delta_pct", "op": "<=", "value": -20 }],
                    "limit": 3
                  }, "then": "traffic" }
            ],
            "default": { "then": "insight" }
        }))
        .unwrap();
        let StepConfig::Branch(cfg) = step.config else {
            panic!("expected branch config");
        };
        assert_eq!(cfg.rules.len(), 2);
        assert_eq!(cfg.rules[0].all.as_ref().unwrap()[0].op, CompareOp::Lt);
        assert_eq!(cfg.rules[1].any_in_breakdowns.as_ref().unwrap().limit, Some(3));
        assert_eq!(cfg.fallback.unwrap().then.as_deref(), Some("insight"));
    }

    #[test]
    fn test_unknown_op_rejected() {
        let result: Result<Condition, _> =
            serde_json::from_value(json!({ "metric": "cvr", "op": "~=", "value": 1 }));
        assert!(result.is_err());
    }

    #[test]
    fn test_on_fail_policy() {
        let step: StepDefinition = serde_json::from_value(json!({
            "id": "validate",
            "type": "validation",
            "on_fail": { "action": "terminate", "reason": "bad input" }
        }))
        .unwrap();
        assert!(step.terminates_on_fail());
        assert_eq!(step.on_fail.unwrap().reason.as_deref(), Some("bad input"));
    }

    #[test]
    fn test_parse_legacy_keys_yaml() {
        let yaml = r#"
workflow_id: cvr-drop
version: v1
nodes:
  - id: validate
    type: validation
    checks: [tenant, window]
    next: insight
  - id: insight
    type: insight
    template:
      summary: "CVR moved {{cvr_delta_pct_fmt}}"
      details:
        - "Top segment: {{top_label}}"
"#;
        let wf: WorkflowDefinition = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(wf.id, "cvr-drop");
        assert_eq!(wf.steps.len(), 2);
        assert_eq!(wf.entry_step(), Some("validate"));
        let StepConfig::Insight(cfg) = &wf.steps[1].config else {
            panic!("expected insight config");
        };
        assert_eq!(cfg.template.details.len(), 1);
    }
}
