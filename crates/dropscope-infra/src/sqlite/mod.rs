//! SQLite analytics storage.
//!
//! A read-mostly pool over the session and order tables, and the
//! `AnalyticsSource` implementation that aggregates them.

pub mod pool;
pub mod source;

pub use pool::{AnalyticsPool, default_database_url};
pub use source::SqliteAnalyticsSource;
