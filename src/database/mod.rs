//! Relational Store
//!
//! Pooled SQLite access to the bibliographic corpus (works, authors,
//! authorships, citations). This is the source of truth; the search engine
//! index and every cache entry are derived from it.

mod corpus;
mod migrations;

pub use corpus::{CorpusOps, CorpusStats, WorkRecord};
pub use migrations::run_migrations;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::config::DatabaseConfig;

/// Database connection pool
#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the configured database and bring its schema up to date.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(1)
            .connect_with(options)
            .await?;

        run_migrations(&pool).await?;
        tracing::info!(url = %config.url, "Relational store ready");
        Ok(Self { pool })
    }

    /// Private in-memory database with the full schema.
    ///
    /// A single connection is kept alive for the lifetime of the pool; every
    /// SQLite in-memory connection is its own database.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Get the underlying pool for direct queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
