//! Workflow definition parsing, validation, and the step registry.
//!
//! Converts JSON/YAML documents into the canonical `WorkflowDefinition` IR,
//! rejects unknown step types before deserializing, validates structural
//! constraints (unique ids, resolvable references, usable step configs), and
//! builds the id -> step map the runner and composite steps dispatch through.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use dropscope_types::context::AnalysisContext;
use dropscope_types::workflow::{
    ALLOWED_DIMENSIONS, STEP_TYPES, StepConfig, StepDefinition, WorkflowDefinition,
};
use serde_json::Value;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised while loading a workflow definition or a run context.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// JSON/YAML parse failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// Structural validation failure; lists every problem found.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Malformed workflow graphs. Always fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("workflow has no steps")]
    EmptyWorkflow,

    #[error("duplicate step id '{0}'")]
    DuplicateStepId(String),

    #[error("step '{step_id}' has unknown type '{step_type}'")]
    UnknownStepType { step_id: String, step_type: String },

    #[error("step '{0}' is referenced but not defined")]
    StepNotFound(String),

    #[error("cycle detected: step '{0}' was already dispatched in this run")]
    CycleDetected(String),

    #[error("step limit exceeded: more than {limit} steps dispatched")]
    StepLimitExceeded { limit: usize },
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a JSON string into a validated `WorkflowDefinition`.
pub fn parse_workflow_json(json: &str) -> Result<WorkflowDefinition, DefinitionError> {
    let raw: Value =
        serde_json::from_str(json).map_err(|e| DefinitionError::Parse(e.to_string()))?;
    from_raw(raw)
}

/// Parse a YAML string into a validated `WorkflowDefinition`.
pub fn parse_workflow_yaml(yaml: &str) -> Result<WorkflowDefinition, DefinitionError> {
    let raw: Value =
        serde_yaml_ng::from_str(yaml).map_err(|e| DefinitionError::Parse(e.to_string()))?;
    from_raw(raw)
}

/// Load a workflow file; `.json` files are parsed as JSON, anything else as YAML.
pub fn load_workflow_file(path: &Path) -> Result<WorkflowDefinition, DefinitionError> {
    let content = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        parse_workflow_json(&content)
    } else {
        parse_workflow_yaml(&content)
    }
}

fn from_raw(raw: Value) -> Result<WorkflowDefinition, DefinitionError> {
    check_step_types(&raw)?;
    let def: WorkflowDefinition =
        serde_json::from_value(raw).map_err(|e| DefinitionError::Parse(e.to_string()))?;
    validate_definition(&def)?;
    Ok(def)
}

/// Reject unknown `type` tags with a graph error instead of a generic serde message.
fn check_step_types(raw: &Value) -> Result<(), GraphError> {
    let steps = raw
        .get("steps")
        .or_else(|| raw.get("nodes"))
        .and_then(Value::as_array);

    for step in steps.into_iter().flatten() {
        let Some(step_type) = step.get("type").and_then(Value::as_str) else {
            continue;
        };
        if !STEP_TYPES.contains(&step_type) {
            let step_id = step
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or("<unnamed>")
                .to_string();
            return Err(GraphError::UnknownStepType {
                step_id,
                step_type: step_type.to_string(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a `WorkflowDefinition`.
///
/// Checks:
/// - id and version are non-empty, at least one step exists
/// - step ids are unique
/// - metric_compare steps request at least one metric
/// - branch steps have rules or a default route
/// - breakdown steps resolve at least one allowed dimension
/// - composite steps list at least one sub-step
/// - every `next`, `then`, `default.then` and composite reference resolves
pub fn validate_definition(def: &WorkflowDefinition) -> Result<(), DefinitionError> {
    let mut problems = Vec::new();

    if def.id.trim().is_empty() {
        problems.push("workflow id must not be empty".to_string());
    }
    if def.version.trim().is_empty() {
        problems.push("workflow version must not be empty".to_string());
    }
    if def.steps.is_empty() {
        problems.push("workflow must have at least one step".to_string());
    }

    let mut ids = HashSet::new();
    for step in &def.steps {
        if step.id.trim().is_empty() {
            problems.push("step id must not be empty".to_string());
        }
        if !ids.insert(step.id.as_str()) {
            problems.push(format!("duplicate step id '{}'", step.id));
        }
    }

    for step in &def.steps {
        check_step_config(step, &mut problems);
        for target in references(step) {
            if !ids.contains(target) {
                problems.push(format!(
                    "step '{}' references unknown step '{}'",
                    step.id, target
                ));
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(DefinitionError::Validation(problems.join("; ")))
    }
}

fn check_step_config(step: &StepDefinition, problems: &mut Vec<String>) {
    match &step.config {
        StepConfig::MetricCompare(cfg) if cfg.metrics.is_empty() => {
            problems.push(format!("metric_compare step '{}' requests no metrics", step.id));
        }
        StepConfig::Branch(cfg) if cfg.rules.is_empty() && cfg.fallback.is_none() => {
            problems.push(format!(
                "branch step '{}' has neither rules nor a default route",
                step.id
            ));
        }
        StepConfig::RecursiveDimensionBreakdown(cfg) => {
            let dimensions = cfg.dimension_list();
            if dimensions.iter().all(|d| d.trim().is_empty()) {
                problems.push(format!("breakdown step '{}' has no dimension", step.id));
            }
            for dimension in dimensions.iter().filter(|d| !d.trim().is_empty()) {
                if !ALLOWED_DIMENSIONS.contains(&dimension.as_str()) {
                    problems.push(format!(
                        "breakdown step '{}' uses unsupported dimension '{}'",
                        step.id, dimension
                    ));
                }
            }
        }
        StepConfig::Composite(cfg) if cfg.steps.is_empty() => {
            problems.push(format!("composite step '{}' lists no sub-steps", step.id));
        }
        _ => {}
    }
}

/// Every step id this step can hand control to.
fn references(step: &StepDefinition) -> Vec<&str> {
    let mut refs: Vec<&str> = step.next.iter().map(String::as_str).collect();
    match &step.config {
        StepConfig::Branch(cfg) => {
            refs.extend(cfg.rules.iter().filter_map(|r| r.then.as_deref()));
            if let Some(route) = &cfg.fallback {
                refs.extend(route.then.as_deref());
            }
        }
        StepConfig::Composite(cfg) => refs.extend(cfg.steps.iter().map(String::as_str)),
        _ => {}
    }
    refs
}

/// Validate the caller-supplied run context before a run.
///
/// Requires meta with a tenant id, a metric name, complete current and
/// baseline windows, and a current window whose start precedes its end.
pub fn validate_run_context(ctx: &AnalysisContext) -> Result<(), DefinitionError> {
    let Some(meta) = &ctx.meta else {
        return Err(DefinitionError::Validation(
            "run context has no meta".to_string(),
        ));
    };

    let mut problems = Vec::new();
    if meta.tenant_id.trim().is_empty() {
        problems.push("meta.tenantId must not be empty".to_string());
    }
    if meta.metric.trim().is_empty() {
        problems.push("meta.metric must not be empty".to_string());
    }
    match meta.window.and_then(|w| w.bounds()) {
        Some((start, end)) if start >= end => {
            problems.push("meta.window.start must be before meta.window.end".to_string());
        }
        Some(_) => {}
        None => problems.push("meta.window needs both start and end".to_string()),
    }
    if !meta.baseline_window.is_some_and(|w| w.is_complete()) {
        problems.push("meta.baselineWindow needs both start and end".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(DefinitionError::Validation(problems.join("; ")))
    }
}

// ---------------------------------------------------------------------------
// Step registry
// ---------------------------------------------------------------------------

/// Step id -> definition map, resolved once per workflow.
#[derive(Debug, Clone)]
pub struct StepRegistry {
    steps: HashMap<String, StepDefinition>,
}

impl StepRegistry {
    pub fn build(def: &WorkflowDefinition) -> Result<Self, GraphError> {
        if def.steps.is_empty() {
            return Err(GraphError::EmptyWorkflow);
        }
        let mut steps = HashMap::with_capacity(def.steps.len());
        for step in &def.steps {
            if steps.insert(step.id.clone(), step.clone()).is_some() {
                return Err(GraphError::DuplicateStepId(step.id.clone()));
            }
        }
        Ok(Self { steps })
    }

    pub fn get(&self, id: &str) -> Option<&StepDefinition> {
        self.steps.get(id)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use dropscope_types::context::{RunMeta, TimeWindow, window_time};

    const VALID_JSON: &str = r#"{
        "workflow_id": "cvr-drop",
        "version": "v3",
        "nodes": [
            { "id": "validate", "type": "validation", "next": "compare",
              "on_fail": { "action": "terminate", "reason": "invalid input" } },
            { "id": "compare", "type": "metric_compare", "metrics": ["cvr"], "next": "route" },
            { "id": "route", "type": "branch",
              "rules": [{ "all": [{ "metric": "cvr_delta_pct", "op": "<", "value": -5 }], "then": "by_source" }],
              "default": { "then": "insight" } },
            { "id": "by_source", "type": "recursive_dimension_breakdown", "dimension": "utm_source", "next": "insight" },
            { "id": "insight", "type": "insight", "template": { "summary": "CVR {{cvr_delta_pct_fmt}}" } }
        ]
    }"#;

    #[test]
    fn test_parse_valid_json() {
        let def = parse_workflow_json(VALID_JSON).unwrap();
        assert_eq!(def.id, "cvr-drop");
        assert_eq!(def.steps.len(), 5);
        assert_eq!(def.entry_step(), Some("validate"));
    }

    #[test]
    fn test_parse_valid_yaml() {
        let yaml = r#"
id: traffic-check
version: "1"
steps:
  - id: validate
    type: validation
    next: summary
  - id: summary
    type: insight
    template:
      summary: "Tenant {{tenant_id}}"
"#;
        let def = parse_workflow_yaml(yaml).unwrap();
        assert_eq!(def.steps[1].step_type(), "insight");
    }

    #[test]
    fn test_unknown_step_type_rejected_at_load() {
        let json = r#"{ "id": "w", "version": "1", "steps": [
            { "id": "validate", "type": "validation", "next": "magic" },
            { "id": "magic", "type": "forecast" }
        ] }"#;
        let err = parse_workflow_json(json).unwrap_err();
        match err {
            DefinitionError::Graph(GraphError::UnknownStepType { step_id, step_type }) => {
                assert_eq!(step_id, "magic");
                assert_eq!(step_type, "forecast");
            }
            other => panic!("expected UnknownStepType, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_json_is_parse_error() {
        let err = parse_workflow_json("{ not json").unwrap_err();
        assert!(matches!(err, DefinitionError::Parse(_)));
    }

    #[test]
    fn test_validation_lists_every_problem() {
        let json = r#"{ "id": "w", "version": "1", "steps": [
            { "id": "a", "type": "metric_compare", "next": "ghost" },
            { "id": "a", "type": "recursive_dimension_breakdown", "dimension": "device" },
            { "id": "c", "type": "composite", "steps": [] },
            { "id": "d", "type": "branch" }
        ] }"#;
        let err = parse_workflow_json(json).unwrap_err();
        let DefinitionError::Validation(msg) = err else {
            panic!("expected validation error");
        };
        assert!(msg.contains("duplicate step id 'a'"));
        assert!(msg.contains("requests no metrics"));
        assert!(msg.contains("unknown step 'ghost'"));
        assert!(msg.contains("unsupported dimension 'device'"));
        assert!(msg.contains("lists no sub-steps"));
        assert!(msg.contains("neither rules nor a default"));
    }

    #[test]
    fn test_branch_and_composite_references_checked() {
        let json = r#"{ "id": "w", "version": "1", "steps": [
            { "id": "route", "type": "branch", "rules": [{ "then": "nowhere" }],
              "default": { "then": "also_nowhere" } },
            { "id": "group", "type": "composite", "steps": ["route", "missing"] }
        ] }"#;
        let DefinitionError::Validation(msg) = parse_workflow_json(json).unwrap_err() else {
            panic!("expected validation error");
        };
        assert!(msg.contains("'nowhere'"));
        assert!(msg.contains("'also_nowhere'"));
        assert!(msg.contains("'missing'"));
    }

    #[test]
    fn test_load_workflow_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cvr.json");
        std::fs::write(&path, VALID_JSON).unwrap();
        let def = load_workflow_file(&path).unwrap();
        assert_eq!(def.version, "v3");

        let missing = load_workflow_file(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(missing, DefinitionError::Io(_)));
    }

    #[test]
    fn test_registry_rejects_duplicates_and_empty() {
        let mut def = parse_workflow_json(VALID_JSON).unwrap();
        let registry = StepRegistry::build(&def).unwrap();
        assert_eq!(registry.len(), 5);
        assert!(registry.get("by_source").is_some());

        let dup = def.steps[0].clone();
        def.steps.push(dup);
        assert_eq!(
            StepRegistry::build(&def).unwrap_err(),
            GraphError::DuplicateStepId("validate".to_string())
        );

        def.steps.clear();
        assert_eq!(
            StepRegistry::build(&def).unwrap_err(),
            GraphError::EmptyWorkflow
        );
    }

    fn window(start: &str, end: &str) -> TimeWindow {
        TimeWindow::new(
            window_time::parse(start).unwrap(),
            window_time::parse(end).unwrap(),
        )
    }

    #[test]
    fn test_run_context_validation() {
        let ok = AnalysisContext::new(RunMeta::new(
            "TMC",
            "cvr",
            window("2026-01-18 00:00:00", "2026-01-19 00:00:00"),
            window("2026-01-17 00:00:00", "2026-01-18 00:00:00"),
        ));
        validate_run_context(&ok).unwrap();

        let reversed = AnalysisContext::new(RunMeta::new(
            "",
            "cvr",
            window("2026-01-19 00:00:00", "2026-01-18 00:00:00"),
            TimeWindow::default(),
        ));
        let DefinitionError::Validation(msg) = validate_run_context(&reversed).unwrap_err() else {
            panic!("expected validation error");
        };
        assert!(msg.contains("tenantId"));
        assert!(msg.contains("start must be before"));
        assert!(msg.contains("baselineWindow"));

        assert!(validate_run_context(&AnalysisContext::default()).is_err());
    }
}
