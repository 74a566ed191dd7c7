//! Infrastructure layer for DropScope.
//!
//! Contains implementations of the analytics-source port defined in
//! `dropscope-core` (SQLite database, JSON fixtures) and the `config.toml`
//! loader.

pub mod config;
pub mod fixture;
pub mod source;
pub mod sqlite;
