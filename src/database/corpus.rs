//! Corpus database operations
//!
//! Inserts and lookups for works, authors, authorships and citations.

use serde::{Deserialize, Serialize};
use sqlx::Row;

use super::Database;
use crate::core::search::query::{Language, ReadingType, WorkType};
use crate::core::search::WorkDocument;

/// A row of the `works` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkRecord {
    pub id: i64,
    pub title: String,
    #[sqlx(rename = "abstract")]
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub publication_year: Option<i32>,
    pub work_type: Option<String>,
    pub language: Option<String>,
    pub reading_type: Option<String>,
    pub peer_reviewed: bool,
    pub venue: Option<String>,
    pub doi: Option<String>,
}

impl WorkRecord {
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            abstract_text: None,
            publication_year: None,
            work_type: None,
            language: None,
            reading_type: None,
            peer_reviewed: false,
            venue: None,
            doi: None,
        }
    }

    /// Engine document for this work. Values outside the allow-lists are dropped.
    pub fn to_document(&self, first_author: Option<String>) -> WorkDocument {
        WorkDocument {
            id: self.id,
            title: self.title.clone(),
            abstract_text: self.abstract_text.clone(),
            publication_year: self.publication_year,
            work_type: self.work_type.as_deref().and_then(|t| WorkType::parse(t).ok()),
            language: self.language.as_deref().and_then(|l| Language::parse(l).ok()),
            reading_type: self
                .reading_type
                .as_deref()
                .and_then(|r| ReadingType::parse(r).ok()),
            venue: self.venue.clone(),
            first_author,
            peer_reviewed: self.peer_reviewed,
        }
    }
}

/// Corpus-wide counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusStats {
    pub works: i64,
    pub authors: i64,
    pub citations: i64,
    pub earliest_year: Option<i32>,
    pub latest_year: Option<i32>,
}

/// Extension trait for corpus database operations
pub trait CorpusOps {
    fn insert_work(&self, work: &WorkRecord) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;
    fn get_work(&self, id: i64) -> impl std::future::Future<Output = Result<Option<WorkRecord>, sqlx::Error>> + Send;
    fn first_author(&self, work_id: i64) -> impl std::future::Future<Output = Result<Option<String>, sqlx::Error>> + Send;
    fn insert_author(&self, id: i64, name: &str) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;
    fn add_authorship(&self, work_id: i64, author_id: i64, position: i32) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;
    fn add_citation(&self, citing_id: i64, cited_id: i64) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;
    fn corpus_stats(&self) -> impl std::future::Future<Output = Result<CorpusStats, sqlx::Error>> + Send;
}

impl CorpusOps for Database {
    async fn insert_work(&self, work: &WorkRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO works
                (id, title, abstract, publication_year, work_type, language, reading_type, peer_reviewed, venue, doi)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(work.id)
        .bind(&work.title)
        .bind(&work.abstract_text)
        .bind(work.publication_year)
        .bind(&work.work_type)
        .bind(&work.language)
        .bind(&work.reading_type)
        .bind(work.peer_reviewed)
        .bind(&work.venue)
        .bind(&work.doi)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn get_work(&self, id: i64) -> Result<Option<WorkRecord>, sqlx::Error> {
        sqlx::query_as::<_, WorkRecord>(
            r#"
            SELECT id, title, abstract, publication_year, work_type, language, reading_type, peer_reviewed, venue, doi
            FROM works WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
    }

    async fn first_author(&self, work_id: i64) -> Result<Option<String>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT a.name FROM authorships au
            JOIN authors a ON a.id = au.author_id
            WHERE au.work_id = ?
            ORDER BY au.position ASC
            LIMIT 1
            "#,
        )
        .bind(work_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|r| r.get("name")))
    }

    async fn insert_author(&self, id: i64, name: &str) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT OR REPLACE INTO authors (id, name) VALUES (?, ?)")
            .bind(id)
            .bind(name)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn add_authorship(&self, work_id: i64, author_id: i64, position: i32) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT OR REPLACE INTO authorships (work_id, author_id, position) VALUES (?, ?, ?)")
            .bind(work_id)
            .bind(author_id)
            .bind(position)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn add_citation(&self, citing_id: i64, cited_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT OR IGNORE INTO citations (citing_id, cited_id) VALUES (?, ?)")
            .bind(citing_id)
            .bind(cited_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn corpus_stats(&self) -> Result<CorpusStats, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM works) AS works,
                (SELECT COUNT(*) FROM authors) AS authors,
                (SELECT COUNT(*) FROM citations) AS citations,
                (SELECT MIN(publication_year) FROM works) AS earliest_year,
                (SELECT MAX(publication_year) FROM works) AS latest_year
            "#,
        )
        .fetch_one(self.pool())
        .await?;

        Ok(CorpusStats {
            works: row.get("works"),
            authors: row.get("authors"),
            citations: row.get("citations"),
            earliest_year: row.try_get("earliest_year").ok().flatten(),
            latest_year: row.try_get("latest_year").ok().flatten(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_work_roundtrip_and_first_author() {
        let db = Database::in_memory().await.unwrap();
        let mut work = WorkRecord::new(1, "Graph Theory");
        work.publication_year = Some(1999);
        work.work_type = Some("article".into());
        work.language = Some("klingon".into());
        db.insert_work(&work).await.unwrap();
        db.insert_author(10, "Second").await.unwrap();
        db.insert_author(11, "First").await.unwrap();
        db.add_authorship(1, 10, 2).await.unwrap();
        db.add_authorship(1, 11, 1).await.unwrap();

        let loaded = db.get_work(1).await.unwrap().unwrap();
        assert_eq!(loaded, work);
        assert_eq!(db.first_author(1).await.unwrap().as_deref(), Some("First"));

        let document = loaded.to_document(Some("First".into()));
        assert_eq!(document.work_type, Some(WorkType::Article));
        assert!(document.language.is_none());
    }

    #[tokio::test]
    async fn test_corpus_stats() {
        let db = Database::in_memory().await.unwrap();
        assert_eq!(db.corpus_stats().await.unwrap(), CorpusStats::default());

        for (id, year) in [(1, 2001), (2, 2015)] {
            let mut work = WorkRecord::new(id, format!("Work {}", id));
            work.publication_year = Some(year);
            db.insert_work(&work).await.unwrap();
        }
        db.add_citation(2, 1).await.unwrap();
        db.add_citation(2, 1).await.unwrap();

        let stats = db.corpus_stats().await.unwrap();
        assert_eq!(stats.works, 2);
        assert_eq!(stats.citations, 1);
        assert_eq!(stats.earliest_year, Some(2001));
        assert_eq!(stats.latest_year, Some(2015));
    }
}
