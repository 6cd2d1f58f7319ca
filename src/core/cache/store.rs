//! Cache Store Backends
//!
//! Key/value stores with per-key TTL behind one async trait:
//!
//! - [`RedisStore`]: the shared store, reached over the Redis protocol.
//! - [`MemoryStore`]: bounded in-process LRU, used for single-node runs and tests.
//!
//! Both return raw serialized strings; typing happens in the adapter.

use std::num::NonZeroUsize;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::Instant;

use crate::config::CacheSettings;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum CacheError {
    /// Store unreachable, timed out or refused the command.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;

// ============================================================================
// Store Trait
// ============================================================================

/// A key/value store with per-key expiry. Writes are last-write-wins.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a live value. Expired keys are never returned.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, overwriting any previous value.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Short backend label for logs and status.
    fn backend_name(&self) -> &'static str;
}

// ============================================================================
// Redis Store
// ============================================================================

/// Redis-backed store. The connection is established lazily on first use;
/// a failed attempt is retried on the next call.
pub struct RedisStore {
    client: redis::Client,
    manager: OnceCell<ConnectionManager>,
    op_timeout: Duration,
}

/// Address and credentials for the key/value store, built field by field so a
/// password with reserved URL characters is passed through untouched.
pub fn connection_info(settings: &CacheSettings) -> ConnectionInfo {
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(settings.host.clone(), settings.port),
        redis: RedisConnectionInfo {
            db: settings.db,
            password: settings.password.clone().filter(|p| !p.is_empty()),
            ..Default::default()
        },
    }
}

impl RedisStore {
    pub fn new(settings: &CacheSettings, op_timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(connection_info(settings))
            .map_err(|e| CacheError::Unavailable(format!("invalid redis address: {}", e)))?;
        Ok(Self {
            client,
            manager: OnceCell::new(),
            op_timeout,
        })
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let manager = self
            .manager
            .get_or_try_init(|| async {
                let connect = self.client.get_connection_manager();
                match tokio::time::timeout(self.op_timeout, connect).await {
                    Ok(Ok(manager)) => {
                        tracing::info!("Connected to redis cache store");
                        Ok(manager)
                    }
                    Ok(Err(e)) => Err(CacheError::Unavailable(e.to_string())),
                    Err(_) => Err(CacheError::Unavailable("connect timed out".to_string())),
                }
            })
            .await?;
        Ok(manager.clone())
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T>
    where
        F: std::future::Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => result.map_err(|e| CacheError::Unavailable(e.to_string())),
            Err(_) => Err(CacheError::Unavailable("command timed out".to_string())),
        }
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = self.bounded(conn.get(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        // SETEX rejects a zero expiry
        let seconds = ttl.as_secs().max(1);
        let _: () = self.bounded(conn.set_ex(key, value, seconds)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = self.bounded(conn.del(key)).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

// ============================================================================
// Memory Store
// ============================================================================

#[derive(Debug, Clone)]
struct StoredEntry {
    value: String,
    expires_at: Instant,
}

impl StoredEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process LRU store with absolute expiry per entry.
pub struct MemoryStore {
    entries: Mutex<LruCache<String, StoredEntry>>,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of entries held, including expired ones not yet evicted.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        if ttl.is_zero() {
            return Ok(());
        }
        let entry = StoredEntry {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        };
        self.entries.lock().await.put(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().await.pop(key);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
