//! SQLite implementation of the analytics-source port.
//!
//! Translates `MetricQuery` / `BreakdownQuery` intents into aggregate SQL
//! over `hourly_sessions`, `segment_sessions` and `orders`. Dimension names
//! are interpolated into SQL, so every one is checked against
//! `ALLOWED_DIMENSIONS` first; values always travel as bound parameters.

use chrono::NaiveDateTime;
use dropscope_core::source::{AnalyticsSource, BreakdownQuery, MetricQuery};
use dropscope_types::analytics::{DimensionRow, MetricTotalsRow};
use dropscope_types::error::SourceError;
use dropscope_types::workflow::{ALLOWED_DIMENSIONS, PRODUCT_DIMENSION};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::pool::AnalyticsPool;

/// SQLite-backed implementation of `AnalyticsSource`.
pub struct SqliteAnalyticsSource {
    pool: AnalyticsPool,
}

impl SqliteAnalyticsSource {
    pub fn new(pool: AnalyticsPool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// SQL
// ---------------------------------------------------------------------------

const METRIC_TOTALS_SQL: &str = "
WITH
current_sessions AS (
  SELECT COALESCE(SUM(sessions), 0) AS sessions,
         COALESCE(SUM(atc_sessions), 0) AS atc_sessions
  FROM hourly_sessions
  WHERE tenant_id = ?
    AND date || ' ' || printf('%02d', hour) || ':00:00' >= ?
    AND date || ' ' || printf('%02d', hour) || ':00:00' <  ?
),
baseline_sessions AS (
  SELECT COALESCE(SUM(sessions), 0) AS sessions,
         COALESCE(SUM(atc_sessions), 0) AS atc_sessions
  FROM hourly_sessions
  WHERE tenant_id = ?
    AND date || ' ' || printf('%02d', hour) || ':00:00' >= ?
    AND date || ' ' || printf('%02d', hour) || ':00:00' <  ?
),
current_orders AS (
  SELECT COUNT(DISTINCT order_name) AS orders
  FROM orders
  WHERE tenant_id = ? AND created_at >= ? AND created_at < ?
),
baseline_orders AS (
  SELECT COUNT(DISTINCT order_name) AS orders
  FROM orders
  WHERE tenant_id = ? AND created_at >= ? AND created_at < ?
)
SELECT
  cs.sessions AS current_sessions,
  bs.sessions AS baseline_sessions,
  cs.atc_sessions AS current_atc_sessions,
  bs.atc_sessions AS baseline_atc_sessions,
  co.orders AS current_orders,
  bo.orders AS baseline_orders
FROM current_sessions cs
CROSS JOIN baseline_sessions bs
CROSS JOIN current_orders co
CROSS JOIN baseline_orders bo";

fn format_time(t: &NaiveDateTime) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn is_allowed(dimension: &str) -> bool {
    ALLOWED_DIMENSIONS.contains(&dimension)
}

/// A breakdown statement and its positional parameters.
struct BreakdownSql {
    sql: String,
    params: Vec<String>,
}

/// Build the breakdown statement for an already-whitelisted dimension.
///
/// Filters on dimensions outside the allowed set are dropped.
fn breakdown_sql(query: &BreakdownQuery) -> BreakdownSql {
    let dim = query.dimension.as_str();

    let mut filter_sql = String::new();
    let mut filter_params = Vec::new();
    for filter in query.filters.iter().filter(|f| is_allowed(&f.dimension)) {
        filter_sql.push_str(&format!(" AND {} = ?", filter.dimension));
        filter_params.push(filter.value.clone());
    }

    let titles = query.wants_titles();
    let title_cte = if titles {
        format!(
            "product_titles AS (
  SELECT {PRODUCT_DIMENSION} AS dimension_value, MAX(product_title) AS product_title
  FROM segment_sessions
  WHERE tenant_id = ? AND date >= DATE(?) AND date < DATE(?)
    AND {PRODUCT_DIMENSION} IS NOT NULL{filter_sql}
  GROUP BY {PRODUCT_DIMENSION}
),"
        )
    } else {
        String::new()
    };
    let title_col = if titles { ",\n  pt.product_title" } else { "" };
    let title_join = if titles {
        "LEFT JOIN product_titles pt ON pt.dimension_value = k.dimension_value"
    } else {
        ""
    };

    let sessions_cte = |name: &str| {
        format!(
            "{name} AS (
  SELECT {dim} AS dimension_value,
         COALESCE(SUM(sessions), 0) AS sessions,
         COALESCE(SUM(atc_sessions), 0) AS atc_sessions
  FROM segment_sessions
  WHERE tenant_id = ? AND date >= DATE(?) AND date < DATE(?)
    AND {dim} IS NOT NULL{filter_sql}
  GROUP BY {dim}
)"
        )
    };
    let orders_cte = |name: &str| {
        format!(
            "{name} AS (
  SELECT {dim} AS dimension_value, COUNT(DISTINCT order_name) AS orders
  FROM orders
  WHERE tenant_id = ? AND created_at >= ? AND created_at < ?
    AND {dim} IS NOT NULL{filter_sql}
  GROUP BY {dim}
)"
        )
    };

    let sql = format!(
        "WITH
{current_sessions},
{baseline_sessions},
{current_orders},
{baseline_orders},
{title_cte}
all_keys AS (
  SELECT dimension_value FROM current_sessions
  UNION SELECT dimension_value FROM baseline_sessions
  UNION SELECT dimension_value FROM current_orders
  UNION SELECT dimension_value FROM baseline_orders
)
SELECT
  k.dimension_value,
  COALESCE(cs.sessions, 0) AS current_sessions,
  COALESCE(bs.sessions, 0) AS baseline_sessions,
  COALESCE(cs.atc_sessions, 0) AS current_atc_sessions,
  COALESCE(bs.atc_sessions, 0) AS baseline_atc_sessions,
  COALESCE(co.orders, 0) AS current_orders,
  COALESCE(bo.orders, 0) AS baseline_orders{title_col}
FROM all_keys k
LEFT JOIN current_sessions cs ON cs.dimension_value = k.dimension_value
LEFT JOIN baseline_sessions bs ON bs.dimension_value = k.dimension_value
LEFT JOIN current_orders co ON co.dimension_value = k.dimension_value
LEFT JOIN baseline_orders bo ON bo.dimension_value = k.dimension_value
{title_join}
ORDER BY current_sessions DESC, k.dimension_value",
        current_sessions = sessions_cte("current_sessions"),
        baseline_sessions = sessions_cte("baseline_sessions"),
        current_orders = orders_cte("current_orders"),
        baseline_orders = orders_cte("baseline_orders"),
    );

    let tenant = &query.tenant_id;
    let (ws, we) = (format_time(&query.window.start), format_time(&query.window.end));
    let (bs, be) = (
        format_time(&query.baseline_window.start),
        format_time(&query.baseline_window.end),
    );

    let mut params = Vec::new();
    for (start, end) in [(&ws, &we), (&bs, &be), (&ws, &we), (&bs, &be)] {
        params.extend([tenant.clone(), start.clone(), end.clone()]);
        params.extend(filter_params.iter().cloned());
    }
    if titles {
        // Titles span both windows.
        params.extend([tenant.clone(), bs, we]);
        params.extend(filter_params);
    }

    BreakdownSql { sql, params }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn count(row: &SqliteRow, column: &str) -> Result<u64, sqlx::Error> {
    let value: i64 = row.try_get(column)?;
    Ok(u64::try_from(value).unwrap_or(0))
}

fn totals_from_row(row: &SqliteRow) -> Result<MetricTotalsRow, sqlx::Error> {
    Ok(MetricTotalsRow {
        current_sessions: count(row, "current_sessions")?,
        baseline_sessions: count(row, "baseline_sessions")?,
        current_atc_sessions: count(row, "current_atc_sessions")?,
        baseline_atc_sessions: count(row, "baseline_atc_sessions")?,
        current_orders: count(row, "current_orders")?,
        baseline_orders: count(row, "baseline_orders")?,
    })
}

fn dimension_from_row(row: &SqliteRow, titles: bool) -> Result<DimensionRow, sqlx::Error> {
    let product_title = if titles {
        row.try_get::<Option<String>, _>("product_title")?
    } else {
        None
    };
    Ok(DimensionRow {
        dimension_value: row.try_get("dimension_value")?,
        product_title,
        current_sessions: count(row, "current_sessions")?,
        baseline_sessions: count(row, "baseline_sessions")?,
        current_atc_sessions: count(row, "current_atc_sessions")?,
        baseline_atc_sessions: count(row, "baseline_atc_sessions")?,
        current_orders: count(row, "current_orders")?,
        baseline_orders: count(row, "baseline_orders")?,
    })
}

fn query_error(e: sqlx::Error) -> SourceError {
    SourceError::Query(e.to_string())
}

// ---------------------------------------------------------------------------
// AnalyticsSource implementation
// ---------------------------------------------------------------------------

impl AnalyticsSource for SqliteAnalyticsSource {
    async fn metric_totals(
        &self,
        query: &MetricQuery,
    ) -> Result<Option<MetricTotalsRow>, SourceError> {
        let (ws, we) = (format_time(&query.window.start), format_time(&query.window.end));
        let (bs, be) = (
            format_time(&query.baseline_window.start),
            format_time(&query.baseline_window.end),
        );

        let mut statement = sqlx::query(METRIC_TOTALS_SQL);
        for (start, end) in [(&ws, &we), (&bs, &be), (&ws, &we), (&bs, &be)] {
            statement = statement.bind(&query.tenant_id).bind(start).bind(end);
        }

        let row = statement
            .fetch_optional(&self.pool.pool)
            .await
            .map_err(query_error)?;
        let totals = row.as_ref().map(totals_from_row).transpose().map_err(query_error)?;

        tracing::debug!(
            tenant_id = %query.tenant_id,
            metrics = ?query.metrics,
            found = totals.is_some(),
            "metric totals fetched"
        );
        Ok(totals)
    }

    async fn dimension_breakdown(
        &self,
        query: &BreakdownQuery,
    ) -> Result<Vec<DimensionRow>, SourceError> {
        if !is_allowed(&query.dimension) {
            return Err(SourceError::UnsupportedDimension(query.dimension.clone()));
        }

        let built = breakdown_sql(query);
        let mut statement = sqlx::query(&built.sql);
        for param in &built.params {
            statement = statement.bind(param);
        }

        let rows = statement
            .fetch_all(&self.pool.pool)
            .await
            .map_err(query_error)?;
        let titles = query.wants_titles();
        let rows = rows
            .iter()
            .map(|row| dimension_from_row(row, titles))
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_error)?;

        tracing::debug!(
            tenant_id = %query.tenant_id,
            dimension = %query.dimension,
            filters = query.filters.len(),
            rows = rows.len(),
            "dimension breakdown fetched"
        );
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
