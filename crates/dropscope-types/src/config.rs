//! Global configuration types for DropScope.
//!
//! `GlobalConfig` represents the `config.toml` in the data directory that
//! selects the analytics source and logging options.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which analytics source backs metric and breakdown queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,
    /// JSON fixture file for `kind = "fixture"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixture_path: Option<PathBuf>,
    /// sqlx connection URL for `kind = "sqlite"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    4
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            fixture_path: None,
            database_url: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Fixture,
    Sqlite,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// Export spans through OpenTelemetry (stdout exporter).
    #[serde(default)]
    pub otel: bool,
}

/// How log lines are written to stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_config_default_values() {
        let config = GlobalConfig::default();
        assert_eq!(config.source.kind, SourceKind::Fixture);
        assert_eq!(config.source.max_connections, 4);
        assert!(!config.logging.otel);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_global_config_deserialize_with_defaults() {
        let config: GlobalConfig = toml::from_str("").unwrap();
        assert_eq!(config.source.kind, SourceKind::Fixture);
        assert!(config.source.database_url.is_none());
    }

    #[test]
    fn test_global_config_deserialize_with_values() {
        let toml_str = r#"
[source]
kind = "sqlite"
database_url = "sqlite://analytics.db"
max_connections = 8

[logging]
format = "json"
otel = true
"#;
        let config: GlobalConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.source.kind, SourceKind::Sqlite);
        assert_eq!(config.source.database_url.as_deref(), Some("sqlite://analytics.db"));
        assert_eq!(config.source.max_connections, 8);
        assert!(config.logging.otel);
        assert_eq!(config.logging.format, LogFormat::Json);
    }
}
