//! Service facade
//!
//! Builds every component from [`AppConfig`] and exposes the operations the
//! request-handling layer calls.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{AppConfig, ConfigError};
use crate::core::cache::{CacheAdapter, CacheCategory, CacheStats};
use crate::core::graph::{GraphBuilder, GraphError, GraphLimits, Network, NetworkKind, SqlGraphSource};
use crate::core::search::{
    FacetResponse, FallbackClient, PrimaryClient, PrimaryStatus, SearchBackend, SearchError,
    SearchOrchestrator, SearchQuery, SearchResponse, WorkDocument, WorkPatch,
};
use crate::database::{CorpusOps, CorpusStats, Database};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Work {0} not found")]
    WorkNotFound(i64),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Health snapshot for operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    /// `None` when the primary engine is switched off.
    pub primary: Option<PrimaryStatus>,
    pub fallback_enabled: bool,
    pub cache: CacheStats,
}

pub struct BiblioService {
    db: Database,
    primary: Option<Arc<PrimaryClient>>,
    orchestrator: SearchOrchestrator,
    graph: GraphBuilder,
    cache: Arc<CacheAdapter>,
}

impl BiblioService {
    /// Open the relational store and wire up the configured components.
    ///
    /// The primary engine connects lazily on first use, so an unreachable
    /// engine does not prevent startup.
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let db = Database::connect(&config.database).await?;
        let cache = Arc::new(CacheAdapter::from_settings(&config.cache));
        let primary = config
            .engine
            .enabled
            .then(|| Arc::new(PrimaryClient::new(config.engine.clone())));

        tracing::info!(
            primary = primary.is_some(),
            fallback = config.search.fallback_enabled,
            cache = %cache.stats().backend,
            "search service ready"
        );
        Ok(Self::from_parts(config, db, primary, cache))
    }

    /// Assemble from already-built parts.
    pub fn from_parts(
        config: &AppConfig,
        db: Database,
        primary: Option<Arc<PrimaryClient>>,
        cache: Arc<CacheAdapter>,
    ) -> Self {
        let mut orchestrator =
            SearchOrchestrator::new(cache.clone()).with_snippet_chars(config.search.snippet_chars);
        if let Some(client) = &primary {
            orchestrator = orchestrator.with_primary(client.clone() as Arc<dyn SearchBackend>);
        }
        if config.search.fallback_enabled {
            orchestrator = orchestrator.with_fallback(Arc::new(FallbackClient::new(db.clone())));
        }

        let graph = GraphBuilder::new(
            Arc::new(SqlGraphSource::new(db.clone())),
            GraphLimits::from(&config.graph),
        );

        Self {
            db,
            primary,
            orchestrator,
            graph,
            cache,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        Ok(self.orchestrator.search(query).await?)
    }

    pub async fn facets(&self, text: &str) -> Result<FacetResponse> {
        Ok(self.orchestrator.facets(text).await?)
    }

    /// Bounded network around `seed`, cached per (kind, seed, effective depth).
    pub async fn network(&self, kind: NetworkKind, seed: i64, depth: u32) -> Result<Network> {
        let effective = self.graph.effective_depth(depth);
        let key = self
            .cache
            .key(CacheCategory::Relationships, &(kind, seed, effective));

        if let Some(mut network) = self.cache.get_json::<Network>(&key).await {
            network.requested_depth = depth;
            return Ok(network);
        }

        let network = self.graph.build(kind, seed, depth).await?;
        self.cache
            .set_json(&key, &network, self.cache.ttl_for(CacheCategory::Relationships))
            .await;
        Ok(network)
    }

    /// Corpus-wide counts.
    pub async fn statistics(&self) -> Result<CorpusStats> {
        let key = self.cache.key(CacheCategory::Statistics, "corpus");
        if let Some(stats) = self.cache.get_json::<CorpusStats>(&key).await {
            return Ok(stats);
        }

        let stats = self.db.corpus_stats().await?;
        self.cache
            .set_json(&key, &stats, self.cache.ttl_for(CacheCategory::Statistics))
            .await;
        Ok(stats)
    }

    fn primary(&self) -> Result<&PrimaryClient> {
        self.primary
            .as_deref()
            .ok_or(ServiceError::Search(SearchError::Disabled("primary engine")))
    }

    pub async fn index_work(&self, work: &WorkDocument) -> Result<()> {
        Ok(self.primary()?.index_work(work).await?)
    }

    pub async fn update_work(&self, id: i64, patch: &WorkPatch) -> Result<()> {
        Ok(self.primary()?.update_work(id, patch).await?)
    }

    pub async fn delete_work(&self, id: i64) -> Result<bool> {
        Ok(self.primary()?.delete_work(id).await?)
    }

    /// Push the stored copy of a work to the engine.
    pub async fn reindex_work(&self, id: i64) -> Result<()> {
        let primary = self.primary()?;
        let record = self
            .db
            .get_work(id)
            .await?
            .ok_or(ServiceError::WorkNotFound(id))?;
        let first_author = self.db.first_author(id).await?;
        primary.index_work(&record.to_document(first_author)).await?;
        Ok(())
    }

    pub async fn status(&self) -> ServiceStatus {
        let primary = match &self.primary {
            Some(client) => Some(client.get_status().await),
            None => None,
        };
        ServiceStatus {
            primary,
            fallback_enabled: self.orchestrator.fallback_enabled(),
            cache: self.cache.stats(),
        }
    }
}
