//! Search module for bibliographic works.
//!
//! Two heterogeneous backends behind one contract:
//! - `primary` - dedicated full-text engine over its SQL-like wire protocol
//! - `fallback` - substring search against the relational store
//!
//! The `orchestrator` tries the primary, falls back on recoverable failures and
//! caches what it returns.
//!
//! # Modules
//!
//! - `query` - filter validation and the escaping trust boundary
//! - `models` - result shapes shared by both backends
//! - `error` - error taxonomy

pub mod error;
pub mod fallback;
pub mod models;
pub mod orchestrator;
pub mod primary;
pub mod query;

use async_trait::async_trait;

pub use error::{Result, SearchError};
pub use fallback::FallbackClient;
pub use models::{
    Engine, FacetDimension, FacetResponse, FacetValue, Facets, SearchHit, SearchPage,
    SearchResponse, WorkDocument, WorkPatch,
};
pub use orchestrator::SearchOrchestrator;
pub use primary::{ConnectionState, PrimaryClient, PrimaryStatus};
pub use query::{
    Language, Pagination, QueryError, ReadingType, SearchFilters, SearchQuery, WorkType,
};

/// Values returned per facet dimension.
pub const FACET_LIMIT: usize = 20;

/// Read contract shared by the primary and fallback clients.
///
/// Implementations validate nothing: queries arrive already validated by the
/// orchestrator. Transport failures must be returned, never swallowed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Provenance tag for results from this backend.
    fn engine(&self) -> Engine;

    /// Ranked page of works.
    async fn search_works(&self, query: &SearchQuery) -> Result<SearchPage>;

    /// Number of works matching text and filters.
    async fn count(&self, query: &SearchQuery) -> Result<u64>;

    /// Value counts per dimension, at most `limit` values each.
    async fn facets(&self, query: &SearchQuery, limit: usize) -> Result<Facets>;
}
