//! CLI command definitions for the `dscope` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod run;
pub mod validate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Explain conversion-rate drops by running root-cause workflows.
#[derive(Parser)]
#[command(name = "dscope", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Directory holding config.toml (defaults to ~/.dropscope).
    #[arg(long, global = true, env = "DROPSCOPE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse and validate a workflow definition (JSON or YAML).
    Validate {
        /// Path to the workflow file.
        file: PathBuf,
    },

    /// Run a workflow against a run context.
    Run(run::RunArgs),

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
