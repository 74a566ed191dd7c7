//! Shared domain types for DropScope.
//!
//! This crate contains the domain types used across the DropScope workspace:
//! workflow definitions, the analysis context threaded through a run, scored
//! evidence, step results, insights, analytics rows and configuration.
//!
//! Zero infrastructure dependencies -- only serde, serde_json, chrono, thiserror.

pub mod analytics;
pub mod config;
pub mod context;
pub mod error;
pub mod evidence;
pub mod insight;
pub mod step;
pub mod workflow;
