//! DropScope CLI entry point.
//!
//! Binary name: `dscope`
//!
//! Parses CLI arguments, loads `config.toml`, initializes tracing, then
//! dispatches to the command handler.

mod cli;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use dropscope_infra::config::{default_data_dir, load_global_config};
use dropscope_observe::tracing_setup::{TracingOptions, init_tracing, shutdown_tracing};
use dropscope_types::config::LogFormat;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need config or logging
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "dscope", &mut std::io::stdout());
        return Ok(());
    }

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let loaded = load_global_config(&data_dir).await;
    let config = loaded.config;

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,dropscope_core=debug,dropscope_infra=debug",
        _ => "trace",
    };
    let options = TracingOptions::new(filter)
        .json(config.logging.format == LogFormat::Json)
        .otel(config.logging.otel);
    init_tracing(&options).map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    for warning in &loaded.warnings {
        tracing::warn!(path = %loaded.path.display(), "{warning}");
    }
    tracing::debug!(data_dir = %data_dir.display(), source = ?config.source.kind, "configuration loaded");

    let result = match cli.command {
        Commands::Validate { file } => cli::validate::handle_validate(&file, cli.json),
        Commands::Run(args) => cli::run::handle_run(args, &config, cli.json).await,
        Commands::Completions { .. } => Ok(()),
    };

    shutdown_tracing();
    result
}
