//! `dscope run`: execute a workflow against a run context and report the
//! trace, the strongest evidence and the rendered insight.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use dropscope_core::definition::{load_workflow_file, validate_run_context};
use dropscope_core::runner::{RunOutcome, RunStatus, run_workflow};
use dropscope_core::scoring::{format_pct, format_rate_pct};
use dropscope_infra::source::open_source;
use dropscope_types::config::{GlobalConfig, SourceKind};
use dropscope_types::context::AnalysisContext;
use dropscope_types::evidence::Evidence;
use dropscope_types::insight::{FINAL_INSIGHT_KEY, Insight};
use dropscope_types::step::StepStatus;

/// Evidence rows shown per breakdown.
const EVIDENCE_ROWS: usize = 5;

#[derive(Args)]
pub struct RunArgs {
    /// Path to the workflow file (JSON or YAML).
    pub workflow: PathBuf,

    /// JSON file with the initial analysis context (`{"meta": {...}}`).
    #[arg(long)]
    pub context: PathBuf,

    /// Serve analytics from a JSON fixture file.
    #[arg(long, conflicts_with = "database")]
    pub fixtures: Option<PathBuf>,

    /// Serve analytics from a SQLite database URL.
    #[arg(long)]
    pub database: Option<String>,
}

pub async fn handle_run(args: RunArgs, config: &GlobalConfig, json: bool) -> Result<()> {
    let def = load_workflow_file(&args.workflow)
        .with_context(|| format!("Workflow {} is invalid", args.workflow.display()))?;

    let raw = tokio::fs::read_to_string(&args.context)
        .await
        .with_context(|| format!("Failed to read context {}", args.context.display()))?;
    let ctx: AnalysisContext =
        serde_json::from_str(&raw).with_context(|| "Invalid run context JSON")?;
    validate_run_context(&ctx).with_context(|| "Invalid run context")?;

    let mut source_config = config.source.clone();
    if let Some(path) = args.fixtures {
        source_config.kind = SourceKind::Fixture;
        source_config.fixture_path = Some(path);
    } else if let Some(url) = args.database {
        source_config.kind = SourceKind::Sqlite;
        source_config.database_url = Some(url);
    }
    let source = open_source(&source_config)
        .await
        .with_context(|| "Failed to open analytics source")?;

    let workflow_id = def.id.clone();
    let outcome = run_workflow(def, ctx, Arc::new(source))
        .await
        .with_context(|| format!("Workflow '{workflow_id}' failed"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    display_outcome(&outcome);
    Ok(())
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

fn display_outcome(outcome: &RunOutcome) {
    println!();
    match outcome.status {
        RunStatus::Completed => println!(
            "  {} Run {} completed",
            style("*").green().bold(),
            style(outcome.run_id).cyan()
        ),
        RunStatus::Terminated => println!(
            "  {} Run {} terminated: {}",
            style("!").yellow().bold(),
            style(outcome.run_id).cyan(),
            outcome.reason.as_deref().unwrap_or("no reason given")
        ),
    }
    println!();
    println!("{}", steps_table(outcome));

    let ctx = &outcome.context;
    if ctx.metrics.contains_key("cvr_delta_pct") {
        println!();
        println!(
            "  CVR {} -> {} ({})   Sessions {}   Orders {}",
            format_rate_pct(ctx.metric_f64("baseline_cvr")),
            format_rate_pct(ctx.metric_f64("current_cvr")),
            format_pct(ctx.metric_f64("cvr_delta_pct")),
            format_pct(ctx.metric_f64("sessions_delta_pct")),
            format_pct(ctx.metric_f64("orders_delta_pct")),
        );
    }

    for (key, entries) in &ctx.breakdowns {
        println!();
        println!("  Evidence '{}'", style(key).cyan());
        println!("{}", evidence_table(entries));
    }

    let insight = ctx
        .scratch
        .get(FINAL_INSIGHT_KEY)
        .and_then(|v| serde_json::from_value::<Insight>(v.clone()).ok());
    if let Some(insight) = insight {
        println!();
        println!("  {}", style(&insight.summary).bold());
        for line in &insight.details {
            println!("    - {line}");
        }
        println!(
            "  {}",
            style(format!("confidence {:.2}", insight.confidence)).dim()
        );
    }
    println!();
}

fn steps_table(outcome: &RunOutcome) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").fg(Color::Cyan),
            Cell::new("Step"),
            Cell::new("Type"),
            Cell::new("Status"),
            Cell::new("Next / Reason"),
        ]);

    for (idx, record) in outcome.steps.iter().enumerate() {
        let status = match record.status {
            StepStatus::Pass => Cell::new("pass").fg(Color::Green),
            StepStatus::Fail => Cell::new("fail").fg(Color::Red),
            StepStatus::Terminated => Cell::new("terminated").fg(Color::Yellow),
        };
        let detail = record
            .reason
            .clone()
            .or_else(|| record.next.clone())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(&record.step_id),
            Cell::new(record.step_type),
            status,
            Cell::new(detail),
        ]);
    }
    table
}

fn evidence_table(entries: &[Evidence]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Rank").fg(Color::Cyan),
            Cell::new("Dimension"),
            Cell::new("Segment"),
            Cell::new("Depth"),
            Cell::new("Baseline CVR"),
            Cell::new("Current CVR"),
            Cell::new("CVR change"),
            Cell::new("Sessions change"),
            Cell::new("Share"),
        ]);

    for (idx, entry) in entries.iter().take(EVIDENCE_ROWS).enumerate() {
        table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(&entry.dimension),
            Cell::new(entry.label()),
            Cell::new(entry.depth),
            Cell::new(format_rate_pct(entry.baseline.cvr)),
            Cell::new(format_rate_pct(entry.current.cvr)),
            Cell::new(format_pct(entry.deltas.cvr_delta_pct)),
            Cell::new(format_pct(entry.deltas.sessions_delta_pct)),
            Cell::new(format_rate_pct(Some(entry.session_share))),
        ]);
    }
    table
}
