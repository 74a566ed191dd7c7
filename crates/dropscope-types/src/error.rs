use thiserror::Error;

/// Errors raised by an analytics data source (used by the port in dropscope-core).
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("data source connection error: {0}")]
    Connection(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("unsupported dimension '{0}'")]
    UnsupportedDimension(String),
}
