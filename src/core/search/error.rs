//! Search Error Types
//!
//! Error handling for the search clients and orchestrator.

use std::time::Duration;

use thiserror::Error;

use super::query::QueryError;

/// Search operation errors
#[derive(Error, Debug)]
pub enum SearchError {
    /// Rejected before dispatch; retrying on another engine would fail the same way.
    #[error("Invalid query: {0}")]
    Validation(#[from] QueryError),

    /// Transport failure (refused, reset, handshake, pool closed).
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    /// The engine accepted the connection but rejected the statement.
    #[error("Engine query error: {0}")]
    EngineQuery(String),

    /// Relational store failure on the fallback path.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to decode engine response: {0}")]
    Decode(String),

    /// Path switched off by configuration.
    #[error("{0} is disabled")]
    Disabled(&'static str),

    /// Primary and fallback both failed; both causes are kept.
    #[error("All search engines failed (primary: {primary}; fallback: {fallback})")]
    AllEnginesFailed {
        primary: Box<SearchError>,
        fallback: Box<SearchError>,
    },
}

impl SearchError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn engine_query(msg: impl Into<String>) -> Self {
        Self::EngineQuery(msg.into())
    }

    /// Whether another engine could plausibly serve the same request.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SearchError::Validation(_))
    }

    /// Errors that invalidate the engine connection.
    pub fn is_transport(&self) -> bool {
        matches!(self, SearchError::Connection(_) | SearchError::Timeout(_))
    }

    /// Copy of a failed connect outcome for callers that waited on the same attempt.
    pub(crate) fn replay(&self) -> Self {
        match self {
            SearchError::Timeout(limit) => SearchError::Timeout(*limit),
            SearchError::Connection(msg) => SearchError::Connection(msg.clone()),
            SearchError::EngineQuery(msg) => SearchError::EngineQuery(msg.clone()),
            other => SearchError::Connection(other.to_string()),
        }
    }
}

/// Sort a driver error into the taxonomy above.
pub(crate) fn classify_sqlx(err: sqlx::Error) -> SearchError {
    match err {
        sqlx::Error::Io(e) => SearchError::Connection(e.to_string()),
        sqlx::Error::Tls(e) => SearchError::Connection(e.to_string()),
        sqlx::Error::Protocol(msg) => SearchError::Connection(msg),
        sqlx::Error::PoolTimedOut => SearchError::Connection("connection pool timed out".into()),
        sqlx::Error::PoolClosed => SearchError::Connection("connection pool closed".into()),
        sqlx::Error::WorkerCrashed => SearchError::Connection("connection worker crashed".into()),
        sqlx::Error::Database(e) => SearchError::EngineQuery(e.message().to_string()),
        other @ (sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. }) => SearchError::Decode(other.to_string()),
        other => SearchError::EngineQuery(other.to_string()),
    }
}

/// Result type alias for search operations
pub type Result<T> = std::result::Result<T, SearchError>;
