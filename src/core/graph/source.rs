//! Graph sources
//!
//! Link and metadata lookups for one BFS level at a time.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{QueryBuilder, Row, Sqlite};

use crate::database::Database;

use super::{Link, NetworkKind, NodeInfo, Result};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GraphSource: Send + Sync {
    async fn node_exists(&self, kind: NetworkKind, id: i64) -> Result<bool>;

    /// Every link with at least one endpoint in `frontier`.
    async fn links(&self, kind: NetworkKind, frontier: &[i64]) -> Result<Vec<Link>>;

    /// Metadata for the given nodes. Unknown ids are omitted.
    async fn describe(&self, kind: NetworkKind, ids: &[i64]) -> Result<HashMap<i64, NodeInfo>>;
}

/// [`GraphSource`] over the relational store.
#[derive(Clone, Debug)]
pub struct SqlGraphSource {
    db: Database,
}

impl SqlGraphSource {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    qb.push("(");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}

#[async_trait]
impl GraphSource for SqlGraphSource {
    async fn node_exists(&self, kind: NetworkKind, id: i64) -> Result<bool> {
        let sql = match kind {
            NetworkKind::Citation => "SELECT COUNT(*) FROM works WHERE id = ?",
            NetworkKind::Collaboration => "SELECT COUNT(*) FROM authors WHERE id = ?",
        };
        let count: i64 = sqlx::query_scalar(sql)
            .bind(id)
            .fetch_one(self.db.pool())
            .await?;
        Ok(count > 0)
    }

    async fn links(&self, kind: NetworkKind, frontier: &[i64]) -> Result<Vec<Link>> {
        if frontier.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new("");
        match kind {
            NetworkKind::Citation => {
                qb.push("SELECT citing_id AS source, cited_id AS target, 1.0 AS weight FROM citations WHERE citing_id IN ");
                push_id_list(&mut qb, frontier);
                qb.push(" OR cited_id IN ");
                push_id_list(&mut qb, frontier);
            }
            NetworkKind::Collaboration => {
                qb.push(
                    "SELECT a1.author_id AS source, a2.author_id AS target, CAST(COUNT(*) AS REAL) AS weight \
                     FROM authorships a1 \
                     JOIN authorships a2 ON a1.work_id = a2.work_id AND a1.author_id <> a2.author_id \
                     WHERE a1.author_id IN ",
                );
                push_id_list(&mut qb, frontier);
                qb.push(" GROUP BY a1.author_id, a2.author_id");
            }
        }

        let rows = qb.build().fetch_all(self.db.pool()).await?;
        rows.iter()
            .map(|row| {
                Ok(Link::new(
                    row.try_get("source")?,
                    row.try_get("target")?,
                    row.try_get("weight")?,
                ))
            })
            .collect()
    }

    async fn describe(&self, kind: NetworkKind, ids: &[i64]) -> Result<HashMap<i64, NodeInfo>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(match kind {
            NetworkKind::Citation => "SELECT id, title AS label, publication_year AS year FROM works WHERE id IN ",
            NetworkKind::Collaboration => "SELECT id, name AS label, NULL AS year FROM authors WHERE id IN ",
        });
        push_id_list(&mut qb, ids);

        let rows = qb.build().fetch_all(self.db.pool()).await?;
        let mut info = HashMap::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id")?;
            info.insert(
                id,
                NodeInfo {
                    label: row.try_get("label")?,
                    year: row.try_get("year")?,
                },
            );
        }
        Ok(info)
    }
}
