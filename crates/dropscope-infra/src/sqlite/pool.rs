//! Connection pool and schema for the analytics database.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

/// Session and order tables, keyed by tenant.
///
/// Every dimension a breakdown may slice by is a column on both the segment
/// sessions table and the orders table.
const SCHEMA: [&str; 5] = [
    "CREATE TABLE IF NOT EXISTS hourly_sessions (
        tenant_id TEXT NOT NULL,
        date TEXT NOT NULL,
        hour INTEGER NOT NULL,
        sessions INTEGER NOT NULL DEFAULT 0,
        atc_sessions INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS segment_sessions (
        tenant_id TEXT NOT NULL,
        date TEXT NOT NULL,
        product_id TEXT,
        product_title TEXT,
        utm_source TEXT,
        utm_medium TEXT,
        utm_campaign TEXT,
        utm_content TEXT,
        utm_term TEXT,
        landing_page_path TEXT,
        landing_page_type TEXT,
        referrer_name TEXT,
        sessions INTEGER NOT NULL DEFAULT 0,
        atc_sessions INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS orders (
        tenant_id TEXT NOT NULL,
        order_name TEXT NOT NULL,
        created_at TEXT NOT NULL,
        product_id TEXT,
        utm_source TEXT,
        utm_medium TEXT,
        utm_campaign TEXT,
        utm_content TEXT,
        utm_term TEXT,
        landing_page_path TEXT,
        landing_page_type TEXT,
        referrer_name TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_segment_sessions_tenant_date
        ON segment_sessions (tenant_id, date)",
    "CREATE INDEX IF NOT EXISTS idx_orders_tenant_created
        ON orders (tenant_id, created_at)",
];

/// Pool over the analytics database in WAL mode.
#[derive(Clone)]
pub struct AnalyticsPool {
    pub pool: SqlitePool,
}

impl AnalyticsPool {
    /// Open (creating if missing) the database at `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let opts = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(opts)
            .await?;

        Ok(Self { pool })
    }

    /// Create the analytics tables when absent.
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

/// Returns the default analytics database URL based on `DROPSCOPE_DATA_DIR`,
/// falling back to `~/.dropscope/analytics.db`.
pub fn default_database_url() -> String {
    let data_dir = crate::config::default_data_dir();
    format!("sqlite://{}/analytics.db", data_dir.display())
}
