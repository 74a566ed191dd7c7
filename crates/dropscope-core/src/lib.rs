//! Root-cause-analysis workflow engine for DropScope.
//!
//! This crate interprets a `WorkflowDefinition` against an `AnalysisContext`:
//! - `merge` -- context merge rules for step deltas
//! - `definition` -- JSON/YAML parsing, load-time validation, step registry
//! - `source` -- the analytics data-source port and query intents
//! - `scoring` -- shared rate, delta, ranking and formatting helpers
//! - `step` -- the six step behaviors and their dispatcher
//! - `runner` -- the workflow runner (pointer walk, failure policy, trace)
//!
//! It depends only on `dropscope-types` -- never on `dropscope-infra` or any
//! database crate.

pub mod definition;
pub mod merge;
pub mod runner;
pub mod scoring;
pub mod source;
pub mod step;
