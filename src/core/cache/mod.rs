//! Cache Adapter
//!
//! Wraps a [`CacheStore`] with category-based freshness and failure isolation.
//!
//! # Failure Semantics
//!
//! The adapter never returns an error. A store that is unreachable, slow or
//! returns undecodable data degrades to a miss on read and a no-op on write;
//! the condition is logged and counted in [`CacheStats::errors`].
//!
//! # Categories
//!
//! | Category        | Default TTL | Data                               |
//! |-----------------|-------------|------------------------------------|
//! | `statistics`    | 24 h        | corpus counts, aggregates          |
//! | `relationships` | 6 h         | citation/collaboration networks    |
//! | `listings`      | 1 h         | ordered listings                   |
//! | `search`        | 5 min       | search pages and facets            |
//!
//! Results served by the fallback engine use the shorter fallback TTL.

pub mod store;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::CacheSettings;

pub use store::{CacheError, CacheStore, MemoryStore, RedisStore};

// ============================================================================
// Categories
// ============================================================================

/// Freshness class of a cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheCategory {
    Statistics,
    Listings,
    Relationships,
    Search,
}

impl CacheCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheCategory::Statistics => "statistics",
            CacheCategory::Listings => "listings",
            CacheCategory::Relationships => "relationships",
            CacheCategory::Search => "search",
        }
    }
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved TTL per category.
#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub statistics: Duration,
    pub listings: Duration,
    pub relationships: Duration,
    pub search: Duration,
    pub fallback: Duration,
}

impl From<&CacheSettings> for CacheTtls {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            statistics: Duration::from_secs(settings.statistics_ttl_secs),
            listings: Duration::from_secs(settings.listings_ttl_secs),
            relationships: Duration::from_secs(settings.relationships_ttl_secs),
            search: Duration::from_secs(settings.search_ttl_secs),
            fallback: Duration::from_secs(settings.fallback_ttl_secs),
        }
    }
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self::from(&CacheSettings::default())
    }
}

// ============================================================================
// Stats
// ============================================================================

/// Snapshot of adapter counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub backend: String,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    /// Store failures absorbed by the adapter.
    pub errors: u64,
}

impl CacheStats {
    /// Hit rate over all lookups, 0.0 when nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    errors: AtomicU64,
}

// ============================================================================
// Adapter
// ============================================================================

/// Category-aware cache front. Cheap to share behind an `Arc`.
pub struct CacheAdapter {
    store: Arc<dyn CacheStore>,
    ttls: CacheTtls,
    prefix: String,
    counters: Counters,
}

impl CacheAdapter {
    pub fn new(store: Arc<dyn CacheStore>, ttls: CacheTtls, prefix: impl Into<String>) -> Self {
        Self {
            store,
            ttls,
            prefix: prefix.into(),
            counters: Counters::default(),
        }
    }

    /// Build the configured backend. Redis address errors fall back to memory.
    pub fn from_settings(settings: &CacheSettings) -> Self {
        use crate::config::CacheBackend;

        let store: Arc<dyn CacheStore> = match settings.backend {
            CacheBackend::Redis => match RedisStore::new(settings, Duration::from_secs(1)) {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    tracing::warn!(error = %e, "Redis cache misconfigured, using in-process cache");
                    Arc::new(MemoryStore::new(settings.memory_capacity))
                }
            },
            CacheBackend::Memory => Arc::new(MemoryStore::new(settings.memory_capacity)),
        };
        Self::new(store, CacheTtls::from(settings), settings.key_prefix.clone())
    }

    /// TTL for a category.
    pub fn ttl_for(&self, category: CacheCategory) -> Duration {
        match category {
            CacheCategory::Statistics => self.ttls.statistics,
            CacheCategory::Listings => self.ttls.listings,
            CacheCategory::Relationships => self.ttls.relationships,
            CacheCategory::Search => self.ttls.search,
        }
    }

    /// TTL for results produced by the fallback engine.
    pub fn fallback_ttl(&self) -> Duration {
        self.ttls.fallback
    }

    /// Deterministic key: `{prefix}:{category}:{sha256(json(parts))}`.
    ///
    /// Callers normalize `parts` first; the serialized form must not depend on
    /// map iteration order.
    pub fn key<T: Serialize + ?Sized>(&self, category: CacheCategory, parts: &T) -> String {
        let encoded = serde_json::to_vec(parts).unwrap_or_default();
        let digest = Sha256::digest(&encoded);
        format!("{}:{}:{}", self.prefix, category, hex::encode(digest))
    }

    /// Raw lookup. Store failures are logged and reported as a miss.
    pub async fn get(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(Some(value)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(key, "cache hit");
                Some(value)
            }
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key, error = %e, backend = self.store.backend_name(), "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Raw write, last-write-wins. Store failures are logged and dropped.
    pub async fn set(&self, key: &str, value: &str, ttl: Duration) {
        match self.store.set(key, value, ttl).await {
            Ok(()) => {
                self.counters.writes.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key, error = %e, backend = self.store.backend_name(), "cache write failed");
            }
        }
    }

    /// Typed lookup. Undecodable payloads are treated as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match decode(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key, error = %e, "discarding undecodable cache entry");
                None
            }
        }
    }

    /// Typed write.
    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        match encode(value) {
            Ok(raw) => self.set(key, &raw, ttl).await,
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key, error = %e, "failed to serialize cache value");
            }
        }
    }

    /// Remove a key. Failures are logged and dropped.
    pub async fn invalidate(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(key, error = %e, "cache invalidation failed");
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            backend: self.store.backend_name().to_string(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for CacheAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheAdapter")
            .field("backend", &self.store.backend_name())
            .field("prefix", &self.prefix)
            .field("ttls", &self.ttls)
            .finish()
    }
}

fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, CacheError> {
    Ok(serde_json::from_str(raw)?)
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, CacheError> {
    Ok(serde_json::to_string(value)?)
}
