use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable prefix. Sections are separated by a double underscore,
/// e.g. `BIBLIO_CACHE__HOST` or `BIBLIO_ENGINE__PORT`.
pub const ENV_PREFIX: &str = "BIBLIO_";

/// Stand-in for secrets in printed configuration.
const REDACTED: &str = "********";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
    pub cache: CacheSettings,
    pub search: SearchSettings,
    pub graph: GraphSettings,
    pub logging: LoggingConfig,
}

/// Relational store (source of truth).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL.
    pub url: String,
    pub max_connections: u32,
}

/// Dedicated search engine reached over its SQL-like wire protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Administrative switch; when false every search goes to the fallback.
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Real-time index holding the works mirror.
    pub index: String,
    pub max_connections: u32,
    pub connect_timeout_ms: u64,
    pub query_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Redis,
    Memory,
}

/// Cache store connection and per-category freshness.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
    pub key_prefix: String,
    /// Capacity of the in-process store when `backend = memory`.
    pub memory_capacity: usize,
    pub statistics_ttl_secs: u64,
    pub listings_ttl_secs: u64,
    pub relationships_ttl_secs: u64,
    pub search_ttl_secs: u64,
    /// TTL for results served by the fallback path. Always below `search_ttl_secs`.
    pub fallback_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub fallback_enabled: bool,
    /// Maximum characters kept from an abstract in a result snippet.
    pub snippet_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    /// Hard cap on traversal depth; requests above it are clamped.
    pub max_depth: u32,
    /// Hard cap on edges returned.
    pub max_edges: usize,
    /// Nodes expanded per level.
    pub max_frontier: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
    /// Also write JSON logs to a daily rolling file.
    pub json_file: bool,
    /// Override the default log directory.
    pub directory: Option<PathBuf>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://biblio.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 9306,
            index: "works".to_string(),
            max_connections: 8,
            connect_timeout_ms: 2_000,
            query_timeout_ms: 5_000,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Redis,
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            db: 0,
            key_prefix: "biblio".to_string(),
            memory_capacity: 10_000,
            statistics_ttl_secs: 86_400,
            listings_ttl_secs: 3_600,
            relationships_ttl_secs: 21_600,
            search_ttl_secs: 300,
            fallback_ttl_secs: 60,
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            fallback_enabled: true,
            snippet_chars: 280,
        }
    }
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_edges: 100,
            max_frontier: 250,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_file: false,
            directory: None,
        }
    }
}

impl EngineConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

impl AppConfig {
    /// Load defaults, then the default config file if present, then `BIBLIO_*`
    /// environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Same layering as [`AppConfig::load`] with an explicit file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if path.exists() {
            tracing::info!(path = %path.display(), "Loading config file");
            figment = figment.merge(Toml::file(path));
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults and environment");
        }
        let config: AppConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;
        config.validate()
    }

    /// Reject impossible values and repair the fallback TTL ordering.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid("database.max_connections must be > 0".into()));
        }
        if self.engine.max_connections == 0 {
            return Err(ConfigError::Invalid("engine.max_connections must be > 0".into()));
        }
        // The index name is interpolated into engine statements
        let index = &self.engine.index;
        if index.is_empty() || !index.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ConfigError::Invalid(format!("engine.index '{}' is not an identifier", index)));
        }
        if self.graph.max_depth == 0 || self.graph.max_edges == 0 || self.graph.max_frontier == 0 {
            return Err(ConfigError::Invalid("graph caps must be > 0".into()));
        }
        if self.cache.search_ttl_secs == 0 {
            return Err(ConfigError::Invalid("cache.search_ttl_secs must be > 0".into()));
        }
        if self.cache.fallback_ttl_secs >= self.cache.search_ttl_secs {
            let clamped = (self.cache.search_ttl_secs / 5).max(1);
            tracing::warn!(
                configured = self.cache.fallback_ttl_secs,
                clamped,
                "fallback TTL must be shorter than search TTL"
            );
            self.cache.fallback_ttl_secs = clamped;
        }
        Ok(self)
    }

    /// Copy with secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.cache.password.as_deref().is_some_and(|p| !p.is_empty()) {
            copy.cache.password = Some(REDACTED.to_string());
        }
        copy
    }

    /// Serialize the effective configuration as TOML, secrets masked.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(&self.redacted()).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    fn config_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("biblio-search").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }
}
