//! `dscope validate`: parse a workflow file and summarize its steps.

use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use dropscope_core::definition::load_workflow_file;
use dropscope_types::workflow::{OnFailAction, StepConfig, StepDefinition};

pub fn handle_validate(file: &Path, json: bool) -> Result<()> {
    let def = load_workflow_file(file)
        .with_context(|| format!("Workflow {} is invalid", file.display()))?;

    if json {
        let steps: Vec<_> = def
            .steps
            .iter()
            .map(|s| {
                serde_json::json!({
                    "id": s.id,
                    "type": s.step_type(),
                    "next": s.next,
                    "on_fail": s.on_fail.as_ref().map(|p| on_fail_label(p.action)),
                })
            })
            .collect();
        let out = serde_json::json!({
            "valid": true,
            "id": def.id,
            "version": def.version,
            "steps": steps,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Type"),
            Cell::new("Routes to"),
            Cell::new("On fail"),
        ]);

    for step in &def.steps {
        table.add_row(vec![
            Cell::new(&step.id),
            Cell::new(step.step_type()),
            Cell::new(routes(step)),
            Cell::new(
                step.on_fail
                    .as_ref()
                    .map(|p| on_fail_label(p.action))
                    .unwrap_or("raise"),
            ),
        ]);
    }

    println!();
    println!(
        "  {} Workflow '{}' (version {}) is valid",
        style("*").green().bold(),
        style(&def.id).cyan(),
        def.version
    );
    if let Some(description) = &def.description {
        println!("  {}", style(description).dim());
    }
    println!();
    println!("{table}");
    println!();

    Ok(())
}

fn on_fail_label(action: OnFailAction) -> &'static str {
    match action {
        OnFailAction::Terminate => "terminate",
        OnFailAction::Raise => "raise",
    }
}

/// Every step id this step can hand control (or sub-steps) to.
fn routes(step: &StepDefinition) -> String {
    let mut targets: Vec<String> = Vec::new();
    match &step.config {
        StepConfig::Branch(cfg) => {
            targets.extend(cfg.rules.iter().filter_map(|r| r.then.clone()));
            if let Some(then) = cfg.fallback.as_ref().and_then(|d| d.then.clone()) {
                targets.push(format!("{then} (default)"));
            }
        }
        StepConfig::Composite(cfg) => {
            targets.push(format!("[{}]", cfg.steps.join(", ")));
        }
        _ => {}
    }
    if let Some(next) = &step.next {
        targets.push(next.clone());
    }
    if targets.is_empty() {
        "-".to_string()
    } else {
        targets.join(", ")
    }
}
