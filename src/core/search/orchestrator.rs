//! Search Orchestrator
//!
//! Serves search and facet requests from the cache, the primary engine or the
//! fallback store, in that order.
//!
//! # Dispatch
//!
//! 1. Validate. Invalid requests never reach a backend.
//! 2. Cache lookup on the normalized request; hits return `cached = true`
//!    with the engine that originally produced them.
//! 3. Primary engine, once. A recoverable failure (connection, timeout,
//!    engine error) moves to step 4; there is no second primary attempt.
//! 4. Fallback store, once.
//! 5. Both failed: [`SearchError::AllEnginesFailed`] with both causes.
//!
//! A zero-hit primary result is a success and is returned as such.
//!
//! Results from the fallback are cached with the shorter fallback TTL.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::core::cache::{CacheAdapter, CacheCategory};

use super::error::{Result, SearchError};
use super::models::{
    sort_hits, Engine, FacetResponse, Facets, SearchHit, SearchPage, SearchResponse,
};
use super::query::{canonical_text, SearchQuery};
use super::{SearchBackend, FACET_LIMIT};

const ELLIPSIS: char = '…';

pub struct SearchOrchestrator {
    primary: Option<Arc<dyn SearchBackend>>,
    fallback: Option<Arc<dyn SearchBackend>>,
    cache: Arc<CacheAdapter>,
    snippet_chars: usize,
}

impl SearchOrchestrator {
    /// An orchestrator with no backends; add them with the `with_*` methods.
    pub fn new(cache: Arc<CacheAdapter>) -> Self {
        Self {
            primary: None,
            fallback: None,
            cache,
            snippet_chars: 280,
        }
    }

    pub fn with_primary(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.primary = Some(backend);
        self
    }

    pub fn with_fallback(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.fallback = Some(backend);
        self
    }

    pub fn with_snippet_chars(mut self, chars: usize) -> Self {
        self.snippet_chars = chars;
        self
    }

    pub fn primary_enabled(&self) -> bool {
        self.primary.is_some()
    }

    pub fn fallback_enabled(&self) -> bool {
        self.fallback.is_some()
    }

    pub fn cache(&self) -> &Arc<CacheAdapter> {
        &self.cache
    }

    /// Ranked, paginated search.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        let started = Instant::now();
        let parsed = query.validate()?;

        let key = self.cache.key(CacheCategory::Search, &query.fingerprint(&parsed));
        if let Some(mut response) = self.cache.get_json::<SearchResponse>(&key).await {
            response.cached = true;
            response.query_time_ms = started.elapsed().as_millis() as u64;
            tracing::debug!(engine = %response.engine, "search served from cache");
            return Ok(response);
        }

        let (engine, page) = self
            .dispatch("search", |backend| async move { backend.search_works(query).await })
            .await?;

        let (results, total) = self.normalize_page(page, query.pagination.limit as usize);
        let response = SearchResponse {
            results,
            total,
            query_time_ms: started.elapsed().as_millis() as u64,
            engine,
            cached: false,
        };

        self.cache.set_json(&key, &response, self.ttl_for(engine)).await;
        tracing::debug!(
            engine = %engine,
            total,
            elapsed_ms = response.query_time_ms,
            "search complete"
        );
        Ok(response)
    }

    /// Facet counts for free text. Count and facet sub-queries run
    /// concurrently on the serving engine.
    pub async fn facets(&self, text: &str) -> Result<FacetResponse> {
        let started = Instant::now();
        let query = SearchQuery::text(text);
        let parsed = query.validate()?;

        let key = self
            .cache
            .key(CacheCategory::Search, &("facets", canonical_text(&parsed)));
        if let Some(mut response) = self.cache.get_json::<FacetResponse>(&key).await {
            response.cached = true;
            response.query_time_ms = started.elapsed().as_millis() as u64;
            return Ok(response);
        }

        let query = &query;
        let (engine, (total, mut dimensions)) = self
            .dispatch("facets", |backend| async move {
                tokio::try_join!(backend.count(query), backend.facets(query, FACET_LIMIT))
            })
            .await?;

        clamp_facets(&mut dimensions, total);
        let response = FacetResponse {
            total,
            dimensions,
            engine,
            cached: false,
            query_time_ms: started.elapsed().as_millis() as u64,
        };

        self.cache.set_json(&key, &response, self.ttl_for(engine)).await;
        Ok(response)
    }

    fn ttl_for(&self, engine: Engine) -> std::time::Duration {
        match engine {
            Engine::Primary => self.cache.ttl_for(CacheCategory::Search),
            Engine::Fallback => self.cache.fallback_ttl(),
        }
    }

    /// Primary once, then fallback once.
    async fn dispatch<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<(Engine, T)>
    where
        F: Fn(Arc<dyn SearchBackend>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let primary_error = match &self.primary {
            Some(primary) => match call(Arc::clone(primary)).await {
                Ok(value) => return Ok((Engine::Primary, value)),
                Err(e) if !e.is_recoverable() => return Err(e),
                Err(e) => {
                    tracing::warn!(operation, error = %e, "primary engine failed, using fallback");
                    e
                }
            },
            None => SearchError::Disabled("primary engine"),
        };

        let fallback_error = match &self.fallback {
            Some(fallback) => match call(Arc::clone(fallback)).await {
                Ok(value) => return Ok((Engine::Fallback, value)),
                Err(e) if !e.is_recoverable() => return Err(e),
                Err(e) => e,
            },
            None => SearchError::Disabled("fallback engine"),
        };

        tracing::error!(
            operation,
            primary = %primary_error,
            fallback = %fallback_error,
            "all search engines failed"
        );
        Err(SearchError::AllEnginesFailed {
            primary: Box::new(primary_error),
            fallback: Box::new(fallback_error),
        })
    }

    fn normalize_page(&self, page: SearchPage, limit: usize) -> (Vec<SearchHit>, u64) {
        let mut hits: Vec<SearchHit> = page
            .hits
            .into_iter()
            .map(|hit| self.normalize_hit(hit))
            .collect();
        sort_hits(&mut hits);
        hits.truncate(limit);
        let total = page.total.max(hits.len() as u64);
        (hits, total)
    }

    fn normalize_hit(&self, mut hit: SearchHit) -> SearchHit {
        hit.title = hit.title.split_whitespace().collect::<Vec<_>>().join(" ");
        hit.snippet = hit
            .snippet
            .map(|text| truncate_snippet(&text, self.snippet_chars))
            .filter(|text| !text.is_empty());
        if !hit.score.is_finite() {
            hit.score = 0.0;
        }
        hit
    }
}

/// Collapse whitespace and cut to `max_chars` characters, marking the cut.
fn truncate_snippet(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut cut: String = collapsed.chars().take(max_chars).collect();
    cut.truncate(cut.trim_end().len());
    cut.push(ELLIPSIS);
    cut
}

/// Cap each dimension so its counts never sum past `total`.
fn clamp_facets(facets: &mut Facets, total: u64) {
    for values in facets.values_mut() {
        let mut remaining = total;
        for value in values.iter_mut() {
            value.count = value.count.min(remaining);
            remaining -= value.count;
        }
        values.retain(|value| value.count > 0);
    }
}
