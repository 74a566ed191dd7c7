//! JSON fixture analytics source.
//!
//! A fixture file holds one totals row and any number of canned breakdowns:
//!
//! ```json
//! {
//!   "totals": { "current_sessions": 1300, "baseline_sessions": 1500, ... },
//!   "breakdowns": [
//!     { "dimension": "utm_source", "filters": [], "rows": [ ... ] }
//!   ]
//! }
//! ```

use std::path::Path;

use dropscope_core::source::{StaticBreakdown, StaticSource};
use dropscope_types::analytics::MetricTotalsRow;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("failed to read fixture {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid fixture {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
struct FixtureFile {
    #[serde(default)]
    totals: Option<MetricTotalsRow>,
    #[serde(default)]
    breakdowns: Vec<StaticBreakdown>,
}

/// Parse fixture JSON into an in-memory source.
pub fn parse_fixture(json: &str) -> Result<StaticSource, serde_json::Error> {
    let file: FixtureFile = serde_json::from_str(json)?;
    Ok(StaticSource::from_parts(file.totals, file.breakdowns))
}

/// Read a fixture file into an in-memory source.
pub async fn load_fixture_source(path: &Path) -> Result<StaticSource, FixtureError> {
    let path_str = path.display().to_string();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| FixtureError::Io {
            path: path_str.clone(),
            source,
        })?;

    let source = parse_fixture(&content).map_err(|source| FixtureError::Parse {
        path: path_str.clone(),
        source,
    })?;
    tracing::debug!(path = %path_str, "loaded analytics fixture");
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dropscope_core::source::{AnalyticsSource, BreakdownQuery, MetricQuery};
    use dropscope_types::context::{Filter, RunMeta, TimeWindow, window_time};

    const FIXTURE: &str = r#"{
      "totals": { "current_sessions": 1300, "baseline_sessions": 1500,
                  "current_orders": 100, "baseline_orders": 150 },
      "breakdowns": [
        { "dimension": "utm_source",
          "rows": [ { "dimension_value": "google", "current_sessions": 800, "baseline_sessions": 1000,
                      "current_orders": 50, "baseline_orders": 100 } ] },
        { "dimension": "landing_page_path",
          "filters": [ { "dimension": "utm_source", "value": "google" } ],
          "rows": [ { "dimension_value": "/home", "current_sessions": 500 } ] }
      ]
    }"#;

    fn meta() -> RunMeta {
        let w = |s: &str, e: &str| {
            TimeWindow::new(window_time::parse(s).unwrap(), window_time::parse(e).unwrap())
        };
        RunMeta::new(
            "TMC",
            "cvr",
            w("2026-01-18 00:00:00", "2026-01-19 00:00:00"),
            w("2026-01-17 00:00:00", "2026-01-18 00:00:00"),
        )
    }

    #[tokio::test]
    async fn test_load_fixture_serves_rows() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("fixture.json");
        tokio::fs::write(&path, FIXTURE).await.unwrap();

        let source = load_fixture_source(&path).await.unwrap();

        let totals = source
            .metric_totals(&MetricQuery::from_meta(&meta(), &[]).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(totals.current_sessions, 1300);
        assert_eq!(totals.current_atc_sessions, 0);

        let root = BreakdownQuery::from_meta(&meta(), "utm_source", vec![]).unwrap();
        let rows = source.dimension_breakdown(&root).await.unwrap();
        assert_eq!(rows.len(), 1);

        let nested = root.refine("landing_page_path", vec![Filter::new("utm_source", "google")]);
        let rows = source.dimension_breakdown(&nested).await.unwrap();
        assert_eq!(rows[0].dimension_value, "/home");
    }

    #[tokio::test]
    async fn test_missing_and_invalid_fixture() {
        let tmp = tempfile::TempDir::new().unwrap();
        let missing = load_fixture_source(&tmp.path().join("nope.json")).await;
        assert!(matches!(missing, Err(FixtureError::Io { .. })));

        let path = tmp.path().join("bad.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();
        let err = load_fixture_source(&path).await.unwrap_err();
        assert!(err.to_string().contains("invalid fixture"));
    }

    #[test]
    fn test_empty_fixture_has_no_totals() {
        let source = parse_fixture("{}").unwrap();
        assert!(source.breakdown_requests().is_empty());
    }
}
