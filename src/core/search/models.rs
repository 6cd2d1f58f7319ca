//! Search Models
//!
//! Result shapes shared by both backends and the orchestrator.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::query::{Language, QueryError, ReadingType, WorkType};

/// Which backend served a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Primary,
    Fallback,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Primary => "primary",
            Engine::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single matching work. Field-identical across backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: i64,
    pub score: f32,
    pub title: String,
    pub snippet: Option<String>,
    pub publication_year: Option<i32>,
    pub work_type: Option<String>,
    pub language: Option<String>,
    pub venue: Option<String>,
    pub first_author: Option<String>,
    pub peer_reviewed: bool,
}

/// Relevance descending, then publication year descending, then id descending.
pub fn compare_hits(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.publication_year.cmp(&a.publication_year))
        .then_with(|| b.id.cmp(&a.id))
}

pub fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(compare_hits);
}

/// One page as returned by a backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub hits: Vec<SearchHit>,
    pub total: u64,
    pub elapsed_ms: u64,
}

/// Orchestrated search response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub total: u64,
    pub query_time_ms: u64,
    pub engine: Engine,
    pub cached: bool,
}

/// Facet dimensions, in response order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FacetDimension {
    Year,
    Type,
    Language,
    Venue,
    FirstAuthor,
}

impl FacetDimension {
    pub const ALL: [FacetDimension; 5] = [
        FacetDimension::Year,
        FacetDimension::Type,
        FacetDimension::Language,
        FacetDimension::Venue,
        FacetDimension::FirstAuthor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FacetDimension::Year => "year",
            FacetDimension::Type => "type",
            FacetDimension::Language => "language",
            FacetDimension::Venue => "venue",
            FacetDimension::FirstAuthor => "firstAuthor",
        }
    }

    /// Attribute holding the dimension in both the engine index and the works table.
    pub fn column(&self) -> &'static str {
        match self {
            FacetDimension::Year => "publication_year",
            FacetDimension::Type => "work_type",
            FacetDimension::Language => "language",
            FacetDimension::Venue => "venue",
            FacetDimension::FirstAuthor => "first_author",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetValue {
    pub value: String,
    pub count: u64,
}

/// Dimension name to values, ordered by count descending then value.
pub type Facets = BTreeMap<String, Vec<FacetValue>>;

/// Order facet values by count descending, ties by value ascending.
pub fn sort_facet_values(values: &mut [FacetValue]) {
    values.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetResponse {
    pub total: u64,
    pub dimensions: Facets,
    pub engine: Engine,
    pub cached: bool,
    pub query_time_ms: u64,
}

// ============================================================================
// Write Path
// ============================================================================

/// A full work record for the real-time index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkDocument {
    pub id: i64,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub publication_year: Option<i32>,
    pub work_type: Option<WorkType>,
    pub language: Option<Language>,
    pub reading_type: Option<ReadingType>,
    pub venue: Option<String>,
    pub first_author: Option<String>,
    pub peer_reviewed: bool,
}

impl WorkDocument {
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            abstract_text: None,
            publication_year: None,
            work_type: None,
            language: None,
            reading_type: None,
            venue: None,
            first_author: None,
            peer_reviewed: false,
        }
    }
}

/// Partial update: only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkPatch {
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub publication_year: Option<i32>,
    pub work_type: Option<WorkType>,
    pub language: Option<Language>,
    pub reading_type: Option<ReadingType>,
    pub venue: Option<String>,
    pub peer_reviewed: Option<bool>,
}

impl WorkPatch {
    pub fn is_empty(&self) -> bool {
        *self == WorkPatch::default()
    }

    pub fn ensure_not_empty(&self) -> Result<(), QueryError> {
        if self.is_empty() {
            Err(QueryError::EmptyPatch)
        } else {
            Ok(())
        }
    }
}
