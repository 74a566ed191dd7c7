//! Analytics source selected by configuration.

use std::path::PathBuf;

use dropscope_core::source::{AnalyticsSource, BreakdownQuery, MetricQuery, StaticSource};
use dropscope_types::analytics::{DimensionRow, MetricTotalsRow};
use dropscope_types::config::{SourceConfig, SourceKind};
use dropscope_types::error::SourceError;

use crate::fixture::{FixtureError, load_fixture_source};
use crate::sqlite::{AnalyticsPool, SqliteAnalyticsSource, default_database_url};

#[derive(Debug, thiserror::Error)]
pub enum OpenSourceError {
    #[error("fixture source selected but no fixture path configured")]
    MissingFixturePath,

    #[error(transparent)]
    Fixture(#[from] FixtureError),

    #[error("failed to open analytics database {url}: {source}")]
    Database {
        url: String,
        #[source]
        source: sqlx::Error,
    },
}

/// The concrete source a run talks to.
pub enum ConfiguredSource {
    Fixture(StaticSource),
    Sqlite(SqliteAnalyticsSource),
}

impl ConfiguredSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            ConfiguredSource::Fixture(_) => SourceKind::Fixture,
            ConfiguredSource::Sqlite(_) => SourceKind::Sqlite,
        }
    }
}

/// Open the source described by `config`.
///
/// SQLite databases are created when missing and get the analytics schema.
pub async fn open_source(config: &SourceConfig) -> Result<ConfiguredSource, OpenSourceError> {
    match config.kind {
        SourceKind::Fixture => {
            let path: &PathBuf = config
                .fixture_path
                .as_ref()
                .ok_or(OpenSourceError::MissingFixturePath)?;
            Ok(ConfiguredSource::Fixture(load_fixture_source(path).await?))
        }
        SourceKind::Sqlite => {
            let url = config
                .database_url
                .clone()
                .unwrap_or_else(default_database_url);
            let db_err = |source| OpenSourceError::Database {
                url: url.clone(),
                source,
            };
            let pool = AnalyticsPool::connect(&url, config.max_connections)
                .await
                .map_err(db_err)?;
            pool.ensure_schema().await.map_err(db_err)?;
            tracing::info!(%url, "analytics database opened");
            Ok(ConfiguredSource::Sqlite(SqliteAnalyticsSource::new(pool)))
        }
    }
}

impl AnalyticsSource for ConfiguredSource {
    async fn metric_totals(
        &self,
        query: &MetricQuery,
    ) -> Result<Option<MetricTotalsRow>, SourceError> {
        match self {
            ConfiguredSource::Fixture(source) => source.metric_totals(query).await,
            ConfiguredSource::Sqlite(source) => source.metric_totals(query).await,
        }
    }

    async fn dimension_breakdown(
        &self,
        query: &BreakdownQuery,
    ) -> Result<Vec<DimensionRow>, SourceError> {
        match self {
            ConfiguredSource::Fixture(source) => source.dimension_breakdown(query).await,
            ConfiguredSource::Sqlite(source) => source.dimension_breakdown(query).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixture_kind_requires_path() {
        let config = SourceConfig::default();
        let err = open_source(&config).await.err().unwrap();
        assert!(matches!(err, OpenSourceError::MissingFixturePath));
    }

    #[tokio::test]
    async fn test_opens_fixture_and_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = dir.path().join("fixture.json");
        tokio::fs::write(&fixture, r#"{ "breakdowns": [] }"#).await.unwrap();

        let config = SourceConfig {
            fixture_path: Some(fixture),
            ..Default::default()
        };
        let source = open_source(&config).await.unwrap();
        assert_eq!(source.kind(), SourceKind::Fixture);

        let config = SourceConfig {
            kind: SourceKind::Sqlite,
            database_url: Some(format!(
                "sqlite://{}?mode=rwc",
                dir.path().join("analytics.db").display()
            )),
            ..Default::default()
        };
        let source = open_source(&config).await.unwrap();
        assert_eq!(source.kind(), SourceKind::Sqlite);
    }
}
