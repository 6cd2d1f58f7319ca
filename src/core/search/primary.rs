//! Primary Search Client
//!
//! Client for the dedicated full-text engine, reached over its MySQL-compatible
//! wire protocol.
//!
//! # Connection Lifecycle
//!
//! ```text
//! Disconnected --connect()--> Connecting --handshake + check---> Connected
//!      ^                                                            |
//!      +------------------ transport error / timeout ---------------+
//! ```
//!
//! The pool is created lazily by [`PrimaryClient::ensure_connection`] and reused
//! by every request. Connect attempts run one at a time under a mutex, and
//! callers that queued behind an attempt take its outcome instead of starting
//! another, so a burst of requests against a dead engine costs one attempt.
//! Each pool carries the generation of the attempt that opened it; a query
//! failure only tears down the pool it actually ran on.
//!
//! The protocol has no bind parameters for match syntax, so every statement is
//! built as text by the pure `build_*` functions below from values that went
//! through [`super::query`].

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::Row;
use tokio::sync::{Mutex, RwLock};

use crate::config::EngineConfig;

use super::error::{classify_sqlx, Result, SearchError};
use super::models::{
    sort_facet_values, sort_hits, Engine, FacetDimension, FacetValue, Facets, SearchHit,
    SearchPage, WorkDocument, WorkPatch,
};
use super::query::{engine_where_clause, sql_string_literal, ParsedText, SearchQuery};
use super::SearchBackend;

/// Columns returned for every hit.
const HIT_COLUMNS: &str = "id, WEIGHT() AS score, title, abstract, publication_year, \
     work_type, language, venue, first_author, peer_reviewed";

/// Minimum `max_matches` the engine is asked to keep.
const MIN_MAX_MATCHES: u64 = 1000;

// ============================================================================
// Connection State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(label)
    }
}

/// Observability snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryStatus {
    pub state: ConnectionState,
    pub healthy: bool,
    pub index: String,
    pub query_count: u64,
    pub error_count: u64,
    pub avg_latency_ms: f64,
    /// Open connections in the pool (0 when disconnected).
    pub connection_count: u32,
    /// Successful connects since start.
    pub connects: u64,
}

#[derive(Debug, Default)]
struct Metrics {
    queries: AtomicU64,
    errors: AtomicU64,
    latency_us: AtomicU64,
    connects: AtomicU64,
}

impl Metrics {
    fn record(&self, elapsed: Duration, ok: bool) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.latency_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        if !ok {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn avg_latency_ms(&self) -> f64 {
        let queries = self.queries.load(Ordering::Relaxed);
        if queries == 0 {
            return 0.0;
        }
        self.latency_us.load(Ordering::Relaxed) as f64 / queries as f64 / 1000.0
    }
}

// ============================================================================
// Client
// ============================================================================

/// A live pool and the connect attempt that opened it.
#[derive(Clone)]
struct Session {
    pool: MySqlPool,
    generation: u64,
}

pub struct PrimaryClient {
    config: EngineConfig,
    session: RwLock<Option<Session>>,
    state: AtomicU8,
    /// Held for the duration of a connect attempt; guards the last failure.
    connect_lock: Mutex<Option<SearchError>>,
    /// Finished connect attempts.
    attempts: AtomicU64,
    metrics: Metrics,
}

impl PrimaryClient {
    /// Create a client. No connection is made until first use.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            session: RwLock::new(None),
            state: AtomicU8::new(ConnectionState::Disconnected.as_u8()),
            connect_lock: Mutex::new(None),
            attempts: AtomicU64::new(0),
            metrics: Metrics::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub fn index(&self) -> &str {
        &self.config.index
    }

    fn connect_options(&self) -> MySqlConnectOptions {
        // The engine rejects the session SETs sqlx issues by default
        MySqlConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .pipes_as_concat(false)
            .no_engine_substitution(false)
            .timezone(None::<String>)
            .set_names(false)
            .statement_cache_capacity(0)
    }

    async fn current_session(&self) -> Option<Session> {
        if self.state() != ConnectionState::Connected {
            return None;
        }
        self.session.read().await.clone()
    }

    /// Connect now, replacing any existing pool.
    pub async fn connect(&self) -> Result<()> {
        let mut last_failure = self.connect_lock.lock().await;
        self.connect_locked(&mut last_failure).await.map(|_| ())
    }

    /// Return the live pool, connecting first if needed.
    pub async fn ensure_connection(&self) -> Result<MySqlPool> {
        self.acquire_session().await.map(|session| session.pool)
    }

    async fn acquire_session(&self) -> Result<Session> {
        let seen = self.attempts.load(Ordering::Acquire);
        if let Some(session) = self.current_session().await {
            return Ok(session);
        }
        let mut last_failure = self.connect_lock.lock().await;
        // Another caller may have connected while we waited
        if let Some(session) = self.current_session().await {
            return Ok(session);
        }
        // An attempt finished while we waited; its failure is ours too
        if self.attempts.load(Ordering::Acquire) != seen {
            if let Some(e) = last_failure.as_ref() {
                tracing::debug!(error = %e, "sharing failed connect attempt");
                return Err(e.replay());
            }
        }
        self.connect_locked(&mut last_failure).await
    }

    /// One connect attempt. `last_failure` is the guard of `connect_lock`.
    async fn connect_locked(&self, last_failure: &mut Option<SearchError>) -> Result<Session> {
        let generation = self.attempts.load(Ordering::Acquire) + 1;
        let result = self.open_session(generation).await;
        *last_failure = result.as_ref().err().map(SearchError::replay);
        self.attempts.store(generation, Ordering::Release);
        result
    }

    /// Handshake then liveness check.
    async fn open_session(&self, generation: u64) -> Result<Session> {
        self.set_state(ConnectionState::Connecting);
        let timeout = self.config.connect_timeout();
        tracing::debug!(host = %self.config.host, port = self.config.port, generation, "Connecting to search engine");

        let attempt = MySqlPoolOptions::new()
            .max_connections(self.config.max_connections)
            .acquire_timeout(timeout)
            .connect_with(self.connect_options());

        let pool = match tokio::time::timeout(timeout, attempt).await {
            Ok(Ok(pool)) => pool,
            Ok(Err(e)) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(SearchError::connection(e.to_string()));
            }
            Err(_) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(SearchError::Timeout(timeout));
            }
        };

        if let Err(e) = self.check_index(&pool, timeout).await {
            self.set_state(ConnectionState::Disconnected);
            pool.close().await;
            return Err(e);
        }

        let session = Session { pool, generation };
        if let Some(previous) = self.session.write().await.replace(session.clone()) {
            previous.pool.close().await;
        }
        self.set_state(ConnectionState::Connected);
        self.metrics.connects.fetch_add(1, Ordering::Relaxed);
        tracing::info!(index = %self.config.index, generation, "Search engine connected");
        Ok(session)
    }

    /// List indexes and require ours to be present.
    async fn check_index(&self, pool: &MySqlPool, timeout: Duration) -> Result<()> {
        let rows = match tokio::time::timeout(timeout, sqlx::raw_sql("SHOW TABLES").fetch_all(pool)).await {
            Ok(rows) => rows.map_err(classify_sqlx)?,
            Err(_) => return Err(SearchError::Timeout(timeout)),
        };
        let found = rows
            .iter()
            .filter_map(|row| column_string_at(row, 0))
            .any(|name| name == self.config.index);
        if found {
            Ok(())
        } else {
            Err(SearchError::engine_query(format!(
                "index '{}' not found on engine",
                self.config.index
            )))
        }
    }

    /// Drop the pool opened by `generation` if it is still the current one.
    async fn mark_disconnected(&self, generation: u64, cause: &SearchError) {
        let mut current = self.session.write().await;
        if current.as_ref().map(|s| s.generation) != Some(generation) {
            tracing::debug!(generation, error = %cause, "failure on a replaced connection ignored");
            return;
        }
        self.set_state(ConnectionState::Disconnected);
        if let Some(session) = current.take() {
            tokio::spawn(async move { session.pool.close().await });
        }
        drop(current);
        tracing::warn!(generation, error = %cause, "Search engine connection dropped");
    }

    /// Run one operation with the query timeout, metrics and state handling.
    async fn run<T, F, Fut>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(MySqlPool) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let session = match self.acquire_session().await {
            Ok(session) => session,
            Err(e) => {
                self.metrics.record(started.elapsed(), false);
                return Err(e);
            }
        };

        let generation = session.generation;
        let limit = self.config.query_timeout();
        let result = match tokio::time::timeout(limit, f(session.pool)).await {
            Ok(result) => result,
            Err(_) => Err(SearchError::Timeout(limit)),
        };

        let elapsed = started.elapsed();
        self.metrics.record(elapsed, result.is_ok());
        match &result {
            Ok(_) => {
                tracing::debug!(operation, elapsed_ms = elapsed.as_millis() as u64, "engine query ok")
            }
            Err(e) if e.is_transport() => self.mark_disconnected(generation, e).await,
            Err(e) => tracing::debug!(operation, error = %e, "engine query failed"),
        }
        result
    }

    async fn execute(&self, operation: &'static str, sql: String) -> Result<u64> {
        self.run(operation, |pool| async move {
            let done = sqlx::raw_sql(&sql).execute(&pool).await.map_err(classify_sqlx)?;
            Ok(done.rows_affected())
        })
        .await
    }

    // ========================================================================
    // Write Path
    // ========================================================================

    /// Insert or replace a work in the real-time index.
    pub async fn index_work(&self, work: &WorkDocument) -> Result<()> {
        let sql = build_replace_sql(&self.config.index, work);
        self.execute("index_work", sql).await?;
        tracing::debug!(id = work.id, "indexed work");
        Ok(())
    }

    /// Patch the given fields of an indexed work; other fields are kept.
    pub async fn update_work(&self, id: i64, patch: &WorkPatch) -> Result<()> {
        patch.ensure_not_empty()?;
        let sql = build_update_sql(&self.config.index, id, patch);
        self.execute("update_work", sql).await?;
        Ok(())
    }

    /// Remove a work from the index. Returns whether anything was removed.
    pub async fn delete_work(&self, id: i64) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = {}", self.config.index, id);
        Ok(self.execute("delete_work", sql).await? > 0)
    }

    pub async fn get_status(&self) -> PrimaryStatus {
        let state = self.state();
        let connection_count = match self.session.read().await.as_ref() {
            Some(session) if state == ConnectionState::Connected => session.pool.size(),
            _ => 0,
        };
        PrimaryStatus {
            state,
            healthy: state == ConnectionState::Connected,
            index: self.config.index.clone(),
            query_count: self.metrics.queries.load(Ordering::Relaxed),
            error_count: self.metrics.errors.load(Ordering::Relaxed),
            avg_latency_ms: self.metrics.avg_latency_ms(),
            connection_count,
            connects: self.metrics.connects.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl SearchBackend for PrimaryClient {
    fn engine(&self) -> Engine {
        Engine::Primary
    }

    async fn search_works(&self, query: &SearchQuery) -> Result<SearchPage> {
        let parsed = query.validate()?;
        let search_sql = build_search_sql(&self.config.index, &parsed, query);
        let count_sql = build_count_sql(&self.config.index, &parsed, query);
        let started = Instant::now();

        let (mut hits, total) = self
            .run("search", |pool| async move {
                let search = sqlx::raw_sql(&search_sql).fetch_all(&pool);
                let count = sqlx::raw_sql(&count_sql).fetch_one(&pool);
                let (rows, count_row) = tokio::try_join!(search, count).map_err(classify_sqlx)?;
                let hits = rows.iter().map(decode_hit).collect::<Result<Vec<_>>>()?;
                let total = column_u64(&count_row, "total")?.unwrap_or(0);
                Ok((hits, total))
            })
            .await?;

        sort_hits(&mut hits);
        Ok(SearchPage {
            hits,
            total,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn count(&self, query: &SearchQuery) -> Result<u64> {
        let parsed = query.validate()?;
        let sql = build_count_sql(&self.config.index, &parsed, query);
        self.run("count", |pool| async move {
            let row = sqlx::raw_sql(&sql).fetch_one(&pool).await.map_err(classify_sqlx)?;
            Ok(column_u64(&row, "total")?.unwrap_or(0))
        })
        .await
    }

    async fn facets(&self, query: &SearchQuery, limit: usize) -> Result<Facets> {
        let parsed = query.validate()?;
        let statements: Vec<(FacetDimension, String)> = FacetDimension::ALL
            .into_iter()
            .map(|dim| (dim, build_facet_sql(&self.config.index, &parsed, query, dim, limit)))
            .collect();

        self.run("facets", |pool| async move {
            let pending = statements.iter().map(|(dim, sql)| {
                let pool = &pool;
                async move {
                    let rows = sqlx::raw_sql(sql).fetch_all(pool).await.map_err(classify_sqlx)?;
                    let mut values = Vec::with_capacity(rows.len());
                    for row in &rows {
                        if let Some(value) = decode_facet_value(row)? {
                            values.push(value);
                        }
                    }
                    sort_facet_values(&mut values);
                    Ok::<_, SearchError>((dim.as_str().to_string(), values))
                }
            });
            // Every dimension completes before any failure is reported
            join_all(pending).await.into_iter().collect::<Result<BTreeMap<_, _>>>()
        })
        .await
    }
}

// ============================================================================
// Statement Builders
// ============================================================================

pub fn build_search_sql(index: &str, parsed: &ParsedText, query: &SearchQuery) -> String {
    let page = query.pagination;
    let max_matches = (u64::from(page.offset) + u64::from(page.limit)).max(MIN_MAX_MATCHES);
    format!(
        "SELECT {} FROM {}{} ORDER BY score DESC, publication_year DESC, id DESC LIMIT {}, {} OPTION max_matches={}",
        HIT_COLUMNS,
        index,
        engine_where_clause(parsed, &query.filters),
        page.offset,
        page.limit,
        max_matches
    )
}

pub fn build_count_sql(index: &str, parsed: &ParsedText, query: &SearchQuery) -> String {
    format!(
        "SELECT COUNT(*) AS total FROM {}{}",
        index,
        engine_where_clause(parsed, &query.filters)
    )
}

pub fn build_facet_sql(
    index: &str,
    parsed: &ParsedText,
    query: &SearchQuery,
    dimension: FacetDimension,
    limit: usize,
) -> String {
    let column = dimension.column();
    format!(
        "SELECT {column} AS facet_value, COUNT(*) AS cnt FROM {index}{filter} GROUP BY {column} ORDER BY cnt DESC, {column} ASC LIMIT {limit}",
        column = column,
        index = index,
        filter = engine_where_clause(parsed, &query.filters),
        limit = limit
    )
}

fn opt_literal(value: Option<&str>) -> String {
    sql_string_literal(value.unwrap_or_default())
}

pub fn build_replace_sql(index: &str, work: &WorkDocument) -> String {
    format!(
        "REPLACE INTO {} (id, title, abstract, publication_year, work_type, language, reading_type, venue, first_author, peer_reviewed) \
         VALUES ({}, {}, {}, {}, {}, {}, {}, {}, {}, {})",
        index,
        work.id,
        sql_string_literal(&work.title),
        opt_literal(work.abstract_text.as_deref()),
        work.publication_year.unwrap_or(0),
        opt_literal(work.work_type.map(|t| t.as_str())),
        opt_literal(work.language.as_ref().map(|l| l.as_str())),
        opt_literal(work.reading_type.map(|r| r.as_str())),
        opt_literal(work.venue.as_deref()),
        opt_literal(work.first_author.as_deref()),
        u8::from(work.peer_reviewed),
    )
}

/// Partial replace: only fields present in the patch are written.
pub fn build_update_sql(index: &str, id: i64, patch: &WorkPatch) -> String {
    let mut assignments = Vec::new();
    if let Some(title) = &patch.title {
        assignments.push(format!("title = {}", sql_string_literal(title)));
    }
    if let Some(text) = &patch.abstract_text {
        assignments.push(format!("abstract = {}", sql_string_literal(text)));
    }
    if let Some(year) = patch.publication_year {
        assignments.push(format!("publication_year = {}", year));
    }
    if let Some(work_type) = patch.work_type {
        assignments.push(format!("work_type = {}", sql_string_literal(work_type.as_str())));
    }
    if let Some(language) = &patch.language {
        assignments.push(format!("language = {}", sql_string_literal(language.as_str())));
    }
    if let Some(reading_type) = patch.reading_type {
        assignments.push(format!("reading_type = {}", sql_string_literal(reading_type.as_str())));
    }
    if let Some(venue) = &patch.venue {
        assignments.push(format!("venue = {}", sql_string_literal(venue)));
    }
    if let Some(peer_reviewed) = patch.peer_reviewed {
        assignments.push(format!("peer_reviewed = {}", u8::from(peer_reviewed)));
    }
    format!(
        "REPLACE INTO {} SET {} WHERE id = {}",
        index,
        assignments.join(", "),
        id
    )
}

// ============================================================================
// Row Decoding
// ============================================================================

// The engine reports attributes with varying integer widths and signedness,
// and strings as text or binary depending on the attribute type.

fn column_i64(row: &MySqlRow, column: &str) -> Result<Option<i64>> {
    if let Ok(value) = row.try_get::<Option<i64>, _>(column) {
        return Ok(value);
    }
    if let Ok(value) = row.try_get::<Option<u64>, _>(column) {
        return Ok(value.and_then(|v| i64::try_from(v).ok()));
    }
    if let Some(text) = column_string(row, column)? {
        return text
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| SearchError::Decode(format!("column '{}' is not an integer", column)));
    }
    Ok(None)
}

fn column_u64(row: &MySqlRow, column: &str) -> Result<Option<u64>> {
    Ok(column_i64(row, column)?.map(|v| v.max(0) as u64))
}

fn column_f64(row: &MySqlRow, column: &str) -> Result<Option<f64>> {
    if let Ok(value) = row.try_get::<Option<f64>, _>(column) {
        return Ok(value);
    }
    if let Ok(value) = row.try_get::<Option<f32>, _>(column) {
        return Ok(value.map(f64::from));
    }
    Ok(column_i64(row, column)?.map(|v| v as f64))
}

fn column_string(row: &MySqlRow, column: &str) -> Result<Option<String>> {
    if let Ok(value) = row.try_get::<Option<String>, _>(column) {
        return Ok(value);
    }
    match row.try_get::<Option<Vec<u8>>, _>(column) {
        Ok(bytes) => Ok(bytes.map(|b| String::from_utf8_lossy(&b).into_owned())),
        Err(e) => Err(SearchError::Decode(e.to_string())),
    }
}

fn column_string_at(row: &MySqlRow, index: usize) -> Option<String> {
    row.try_get::<String, _>(index).ok().or_else(|| {
        row.try_get::<Vec<u8>, _>(index)
            .ok()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn decode_hit(row: &MySqlRow) -> Result<SearchHit> {
    let id = column_i64(row, "id")?
        .ok_or_else(|| SearchError::Decode("hit without id".to_string()))?;
    Ok(SearchHit {
        id,
        score: column_f64(row, "score")?.unwrap_or(0.0) as f32,
        title: column_string(row, "title")?.unwrap_or_default(),
        snippet: non_empty(column_string(row, "abstract")?),
        publication_year: column_i64(row, "publication_year")?
            .filter(|y| *y > 0)
            .and_then(|y| i32::try_from(y).ok()),
        work_type: non_empty(column_string(row, "work_type")?),
        language: non_empty(column_string(row, "language")?),
        venue: non_empty(column_string(row, "venue")?),
        first_author: non_empty(column_string(row, "first_author")?),
        peer_reviewed: column_i64(row, "peer_reviewed")?.unwrap_or(0) != 0,
    })
}

/// Missing attribute values (empty string, year 0) are skipped.
fn decode_facet_value(row: &MySqlRow) -> Result<Option<FacetValue>> {
    let count = column_u64(row, "cnt")?.unwrap_or(0);
    let value = if let Ok(number) = row.try_get::<Option<i64>, _>("facet_value") {
        number.filter(|n| *n != 0).map(|n| n.to_string())
    } else if let Ok(number) = row.try_get::<Option<u64>, _>("facet_value") {
        number.filter(|n| *n != 0).map(|n| n.to_string())
    } else {
        non_empty(column_string(row, "facet_value")?)
    };
    Ok(value.map(|value| FacetValue { value, count }))
}
