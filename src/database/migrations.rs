//! Database Migrations
//!
//! Versioned bootstrap schema for the corpus tables.

use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::{info, warn};

/// Current database schema version
const SCHEMA_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    let current_version = get_current_version(pool).await?;
    if current_version < SCHEMA_VERSION {
        info!(current_version, target_version = SCHEMA_VERSION, "Running database migrations");
        for version in (current_version + 1)..=SCHEMA_VERSION {
            run_migration(pool, version).await?;
        }
    }

    Ok(())
}

async fn get_current_version(pool: &SqlitePool) -> Result<i32, sqlx::Error> {
    let result = sqlx::query("SELECT MAX(version) as version FROM _migrations")
        .fetch_optional(pool)
        .await?;

    Ok(result
        .and_then(|row| row.try_get::<i32, _>("version").ok())
        .unwrap_or(0))
}

async fn run_migration(pool: &SqlitePool, version: i32) -> Result<(), sqlx::Error> {
    let (name, sql) = match version {
        1 => ("corpus_schema", MIGRATION_V1),
        2 => ("search_indexes", MIGRATION_V2),
        _ => {
            warn!("Unknown migration version: {}", version);
            return Ok(());
        }
    };

    info!("Applying migration v{}: {}", version, name);

    for statement in sql.split(';').filter(|s| !s.trim().is_empty()) {
        sqlx::query(statement.trim()).execute(pool).await?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(version)
        .bind(name)
        .execute(pool)
        .await?;

    Ok(())
}

/// Migration v1: works, authors and the link tables
const MIGRATION_V1: &str = r#"
CREATE TABLE IF NOT EXISTS works (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    abstract TEXT,
    publication_year INTEGER,
    work_type TEXT,
    language TEXT,
    reading_type TEXT,
    peer_reviewed INTEGER NOT NULL DEFAULT 0,
    venue TEXT,
    doi TEXT
);

CREATE TABLE IF NOT EXISTS authors (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS authorships (
    work_id INTEGER NOT NULL REFERENCES works(id) ON DELETE CASCADE,
    author_id INTEGER NOT NULL REFERENCES authors(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    PRIMARY KEY (work_id, author_id)
);

CREATE TABLE IF NOT EXISTS citations (
    citing_id INTEGER NOT NULL REFERENCES works(id) ON DELETE CASCADE,
    cited_id INTEGER NOT NULL REFERENCES works(id) ON DELETE CASCADE,
    PRIMARY KEY (citing_id, cited_id)
)
"#;

/// Migration v2: lookup indexes for graph expansion and facets
const MIGRATION_V2: &str = r#"
CREATE INDEX IF NOT EXISTS idx_works_year ON works(publication_year DESC);
CREATE INDEX IF NOT EXISTS idx_authorships_author ON authorships(author_id);
CREATE INDEX IF NOT EXISTS idx_authorships_position ON authorships(work_id, position);
CREATE INDEX IF NOT EXISTS idx_citations_cited ON citations(cited_id)
"#;
