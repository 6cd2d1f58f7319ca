//! Fallback Search Client
//!
//! Substring search over the relational store. Slower and coarser than the
//! engine, but returns the same shapes so callers never branch on the backend.
//!
//! Relevance is a simple hit count: each positive term scores 2 for a title
//! match and 1 for an abstract match. Every user value is bound as a
//! parameter; LIKE wildcards inside terms are escaped.

use std::time::Instant;

use async_trait::async_trait;
use futures::future::join_all;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use crate::database::Database;

use super::error::{Result, SearchError};
use super::models::{
    sort_facet_values, sort_hits, Engine, FacetDimension, FacetValue, Facets, SearchHit, SearchPage,
};
use super::query::{plain_terms, ParsedText, SearchFilters, SearchQuery};
use super::SearchBackend;

/// Name of the work's first-listed author.
const FIRST_AUTHOR_EXPR: &str = "(SELECT a.name FROM authorships au \
     JOIN authors a ON a.id = au.author_id \
     WHERE au.work_id = w.id ORDER BY au.position ASC LIMIT 1)";

/// Escape `%`, `_` and `\` and wrap for a substring match with `ESCAPE '\'`.
pub fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[derive(Clone, Debug)]
pub struct FallbackClient {
    db: Database,
}

impl FallbackClient {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn facet_values(
        &self,
        parsed: &ParsedText,
        filters: &SearchFilters,
        dimension: FacetDimension,
        limit: usize,
    ) -> Result<(String, Vec<FacetValue>)> {
        let mut qb = QueryBuilder::<Sqlite>::new("");
        match dimension {
            FacetDimension::Year => {
                qb.push("SELECT CAST(w.publication_year AS TEXT) AS facet_value, COUNT(*) AS cnt FROM works w");
                push_conditions(&mut qb, parsed, filters);
                qb.push(" AND w.publication_year IS NOT NULL GROUP BY w.publication_year");
            }
            FacetDimension::FirstAuthor => {
                qb.push(format!("SELECT {} AS facet_value, COUNT(*) AS cnt FROM works w", FIRST_AUTHOR_EXPR));
                push_conditions(&mut qb, parsed, filters);
                qb.push(" GROUP BY facet_value HAVING facet_value IS NOT NULL");
            }
            other => {
                let column = other.column();
                qb.push(format!("SELECT w.{} AS facet_value, COUNT(*) AS cnt FROM works w", column));
                push_conditions(&mut qb, parsed, filters);
                qb.push(format!(
                    " AND w.{col} IS NOT NULL AND w.{col} <> '' GROUP BY w.{col}",
                    col = column
                ));
            }
        }
        qb.push(" ORDER BY cnt DESC, facet_value ASC LIMIT ");
        qb.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));

        let rows = qb.build().fetch_all(self.db.pool()).await?;
        let mut values = rows
            .iter()
            .map(|row| {
                Ok(FacetValue {
                    value: row.try_get("facet_value")?,
                    count: row.try_get::<i64, _>("cnt")?.max(0) as u64,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;
        sort_facet_values(&mut values);
        Ok((dimension.as_str().to_string(), values))
    }
}

/// Append ` WHERE ...` for text clauses and filters. Always emits a WHERE so
/// callers can extend it with ` AND ...`.
fn push_conditions(qb: &mut QueryBuilder<'_, Sqlite>, parsed: &ParsedText, filters: &SearchFilters) {
    qb.push(" WHERE 1 = 1");

    for clause in &parsed.clauses {
        qb.push(if clause.negated { " AND NOT (" } else { " AND (" });
        for (i, term) in clause.alternatives.iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            let pattern = like_pattern(&term.text);
            qb.push("w.title LIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" ESCAPE '\\' OR COALESCE(w.abstract, '') LIKE ");
            qb.push_bind(pattern);
            qb.push(" ESCAPE '\\'");
        }
        qb.push(")");
    }

    if let Some(year) = filters.year {
        qb.push(" AND w.publication_year = ").push_bind(year);
    }
    if let Some(from) = filters.year_from {
        qb.push(" AND w.publication_year >= ").push_bind(from);
    }
    if let Some(to) = filters.year_to {
        qb.push(" AND w.publication_year <= ").push_bind(to);
    }
    if let Some(work_type) = filters.work_type {
        qb.push(" AND w.work_type = ").push_bind(work_type.as_str());
    }
    if let Some(language) = &filters.language {
        qb.push(" AND w.language = ").push_bind(language.as_str());
    }
    if let Some(reading_type) = filters.reading_type {
        qb.push(" AND w.reading_type = ").push_bind(reading_type.as_str());
    }
    if let Some(peer_reviewed) = filters.peer_reviewed {
        qb.push(" AND w.peer_reviewed = ").push_bind(peer_reviewed);
    }
}

/// Relevance expression over the positive terms.
fn push_score(qb: &mut QueryBuilder<'_, Sqlite>, parsed: &ParsedText) {
    let terms = plain_terms(parsed);
    if terms.is_empty() {
        qb.push("1.0");
        return;
    }
    qb.push("CAST(");
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            qb.push(" + ");
        }
        let pattern = like_pattern(term);
        qb.push("(CASE WHEN w.title LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" ESCAPE '\\' THEN 2 ELSE 0 END) + (CASE WHEN COALESCE(w.abstract, '') LIKE ");
        qb.push_bind(pattern);
        qb.push(" ESCAPE '\\' THEN 1 ELSE 0 END)");
    }
    qb.push(" AS REAL)");
}

fn decode_hit(row: &SqliteRow) -> std::result::Result<SearchHit, sqlx::Error> {
    Ok(SearchHit {
        id: row.try_get("id")?,
        score: row.try_get::<f64, _>("score")? as f32,
        title: row.try_get("title")?,
        snippet: row.try_get::<Option<String>, _>("abstract")?.filter(|s| !s.trim().is_empty()),
        publication_year: row.try_get("publication_year")?,
        work_type: row.try_get("work_type")?,
        language: row.try_get("language")?,
        venue: row.try_get("venue")?,
        first_author: row.try_get("first_author")?,
        peer_reviewed: row.try_get("peer_reviewed")?,
    })
}

#[async_trait]
impl SearchBackend for FallbackClient {
    fn engine(&self) -> Engine {
        Engine::Fallback
    }

    async fn search_works(&self, query: &SearchQuery) -> Result<SearchPage> {
        let parsed = query.validate()?;
        let started = Instant::now();

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT w.id, ");
        push_score(&mut qb, &parsed);
        qb.push(format!(
            " AS score, w.title, w.abstract, w.publication_year, w.work_type, w.language, w.venue, \
             {} AS first_author, w.peer_reviewed FROM works w",
            FIRST_AUTHOR_EXPR
        ));
        push_conditions(&mut qb, &parsed, &query.filters);
        qb.push(" ORDER BY score DESC, w.publication_year DESC, w.id DESC LIMIT ");
        qb.push_bind(i64::from(query.pagination.limit));
        qb.push(" OFFSET ");
        qb.push_bind(i64::from(query.pagination.offset));

        let search = async {
            let rows = qb.build().fetch_all(self.db.pool()).await?;
            rows.iter().map(decode_hit).collect::<std::result::Result<Vec<_>, _>>()
        };
        let (hits, total) = tokio::try_join!(
            async { search.await.map_err(SearchError::from) },
            self.count(query)
        )?;

        let mut hits = hits;
        sort_hits(&mut hits);
        tracing::debug!(hits = hits.len(), total, "fallback search complete");
        Ok(SearchPage {
            hits,
            total,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn count(&self, query: &SearchQuery) -> Result<u64> {
        let parsed = query.validate()?;
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM works w");
        push_conditions(&mut qb, &parsed, &query.filters);
        let total: i64 = qb.build_query_scalar().fetch_one(self.db.pool()).await?;
        Ok(total.max(0) as u64)
    }

    async fn facets(&self, query: &SearchQuery, limit: usize) -> Result<Facets> {
        let parsed = query.validate()?;
        let pending = FacetDimension::ALL
            .into_iter()
            .map(|dim| self.facet_values(&parsed, &query.filters, dim, limit));
        join_all(pending).await.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::search::query::{Pagination, WorkType};
    use crate::tests::common::fixtures::seeded_database;

    async fn client() -> FallbackClient {
        FallbackClient::new(seeded_database().await)
    }

    fn ids(page: &SearchPage) -> Vec<i64> {
        page.hits.iter().map(|h| h.id).collect()
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("100%"), "%100\\%%");
        assert_eq!(like_pattern("a_b\\c"), "%a\\_b\\\\c%");
    }

    #[tokio::test]
    async fn test_ranking_by_title_and_abstract_hits() {
        let client = client().await;
        let page = client
            .search_works(&SearchQuery::text("machine learning"))
            .await
            .unwrap();

        assert_eq!(ids(&page), vec![5, 1, 2, 4]);
        assert_eq!(page.total, 4);
        assert!((page.hits[0].score - 4.0).abs() < f32::EPSILON);
        assert_eq!(page.hits[1].first_author.as_deref(), Some("Ada Lovelace"));
    }

    #[tokio::test]
    async fn test_negation_and_alternatives() {
        let client = client().await;
        let page = client
            .search_works(&SearchQuery::text("graph -survey"))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert!(ids(&page).iter().all(|id| [1, 3].contains(id)));

        let page = client
            .search_works(&SearchQuery::text("rank OR theory"))
            .await
            .unwrap();
        let mut found = ids(&page);
        found.sort();
        assert_eq!(found, vec![3, 5]);
    }

    #[tokio::test]
    async fn test_wildcards_are_literal() {
        let client = client().await;
        let page = client.search_works(&SearchQuery::text("100%")).await.unwrap();
        assert_eq!(ids(&page), vec![6]);
        let page = client.search_works(&SearchQuery::text("guide_to")).await.unwrap();
        assert_eq!(ids(&page), vec![6]);
    }

    #[tokio::test]
    async fn test_quote_in_text_is_bound_not_interpolated() {
        let client = client().await;
        let page = client
            .search_works(&SearchQuery::text("O'Reilly's"))
            .await
            .unwrap();
        assert_eq!(ids(&page), vec![6]);
    }

    #[tokio::test]
    async fn test_filters_and_pagination() {
        let client = client().await;
        let filters = SearchFilters {
            year_from: Some(2020),
            ..Default::default()
        };
        let query = SearchQuery::new("machine learning", filters, Pagination::default());
        assert_eq!(client.count(&query).await.unwrap(), 3);

        let query = SearchQuery::new(
            "machine learning",
            SearchFilters::default(),
            Pagination { limit: 2, offset: 1 },
        );
        let page = client.search_works(&query).await.unwrap();
        assert_eq!(ids(&page), vec![1, 2]);
        assert_eq!(page.total, 4);
    }

    #[tokio::test]
    async fn test_filters_only_search() {
        let client = client().await;
        let filters = SearchFilters {
            work_type: Some(WorkType::Book),
            ..Default::default()
        };
        let page = client
            .search_works(&SearchQuery::new("", filters, Pagination::default()))
            .await
            .unwrap();
        let mut found = ids(&page);
        found.sort();
        assert_eq!(found, vec![3, 6]);
    }

    #[tokio::test]
    async fn test_zero_hits_is_success() {
        let client = client().await;
        let page = client
            .search_works(&SearchQuery::text("xylophone"))
            .await
            .unwrap();
        assert!(page.hits.is_empty());
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_facets_per_dimension() {
        let client = client().await;
        let facets = client
            .facets(&SearchQuery::text("machine learning"), 20)
            .await
            .unwrap();

        let values = |dim: &str| -> Vec<(String, u64)> {
            facets[dim].iter().map(|v| (v.value.clone(), v.count)).collect()
        };
        assert_eq!(facets.len(), 5);
        assert_eq!(
            values("type"),
            vec![
                ("article".to_string(), 2),
                ("proceedings-article".to_string(), 1),
                ("review".to_string(), 1)
            ]
        );
        assert_eq!(values("language"), vec![("en".to_string(), 3), ("fr".to_string(), 1)]);
        assert_eq!(values("firstAuthor")[0], ("Ada Lovelace".to_string(), 2));
        assert_eq!(values("year")[0], ("2020".to_string(), 2));
    }
}
