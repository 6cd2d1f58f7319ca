//! Test Fixtures
//!
//! A small seeded corpus shared by the fallback, graph and orchestrator tests.
//!
//! Works (id: title, year, type, language):
//! - 1: Machine Learning for Graphs, 2020, article, en
//! - 2: Deep Learning Survey, 2019, review, en
//! - 3: Graph Theory Basics, 1999, book, en
//! - 4: Apprentissage automatique, 2021, article, fr
//! - 5: Learning to Rank, 2020, proceedings-article, en
//! - 6: O'Reilly's 100% Guide_to SQL, 2010, book, en
//! - 7: Notes on the Analytical Engine, 1843, editorial, en
//! - 8: Citation Analysis Revisited, 2022, article, en
//!
//! Citations form a chain where work 8 sits four hops from work 3.

use std::sync::Arc;

use crate::core::cache::{CacheAdapter, CacheTtls, MemoryStore};
use crate::core::search::{SearchHit, SearchPage};
use crate::database::{CorpusOps, Database, WorkRecord};

pub const ADA: i64 = 1;
pub const ALAN: i64 = 2;
pub const GRACE: i64 = 3;
pub const EDSGER: i64 = 4;

struct SeedWork {
    id: i64,
    title: &'static str,
    abstract_text: Option<&'static str>,
    year: i32,
    work_type: &'static str,
    language: &'static str,
    peer_reviewed: bool,
    venue: Option<&'static str>,
    authors: &'static [i64],
}

const WORKS: &[SeedWork] = &[
    SeedWork {
        id: 1,
        title: "Machine Learning for Graphs",
        abstract_text: Some("Neural methods on graph data"),
        year: 2020,
        work_type: "article",
        language: "en",
        peer_reviewed: true,
        venue: Some("NeurIPS"),
        authors: &[ADA, ALAN],
    },
    SeedWork {
        id: 2,
        title: "Deep Learning Survey",
        abstract_text: Some("A survey of machine learning and deep networks"),
        year: 2019,
        work_type: "review",
        language: "en",
        peer_reviewed: true,
        venue: Some("JMLR"),
        authors: &[ALAN, GRACE],
    },
    SeedWork {
        id: 3,
        title: "Graph Theory Basics",
        abstract_text: Some("Classical results"),
        year: 1999,
        work_type: "book",
        language: "en",
        peer_reviewed: false,
        venue: Some("Springer"),
        authors: &[EDSGER],
    },
    SeedWork {
        id: 4,
        title: "Apprentissage automatique",
        abstract_text: Some("machine learning en français"),
        year: 2021,
        work_type: "article",
        language: "fr",
        peer_reviewed: true,
        venue: Some("Revue IA"),
        authors: &[ADA, GRACE],
    },
    SeedWork {
        id: 5,
        title: "Learning to Rank",
        abstract_text: Some("ranking with machine learning"),
        year: 2020,
        work_type: "proceedings-article",
        language: "en",
        peer_reviewed: true,
        venue: Some("SIGIR"),
        authors: &[GRACE],
    },
    SeedWork {
        id: 6,
        title: "O'Reilly's 100% Guide_to SQL",
        abstract_text: Some("special characters"),
        year: 2010,
        work_type: "book",
        language: "en",
        peer_reviewed: false,
        venue: None,
        authors: &[EDSGER, ADA],
    },
    SeedWork {
        id: 7,
        title: "Notes on the Analytical Engine",
        abstract_text: None,
        year: 1843,
        work_type: "editorial",
        language: "en",
        peer_reviewed: false,
        venue: None,
        authors: &[ADA, GRACE],
    },
    SeedWork {
        id: 8,
        title: "Citation Analysis Revisited",
        abstract_text: Some("bibliometrics"),
        year: 2022,
        work_type: "article",
        language: "en",
        peer_reviewed: true,
        venue: Some("Scientometrics"),
        authors: &[EDSGER],
    },
];

/// (citing, cited)
pub const CITATIONS: &[(i64, i64)] = &[(2, 1), (5, 1), (5, 2), (4, 2), (1, 3), (2, 3), (6, 5), (8, 6)];

/// In-memory database holding the corpus above.
pub async fn seeded_database() -> Database {
    let db = Database::in_memory()
        .await
        .expect("Failed to create in-memory database");

    for (id, name) in [
        (ADA, "Ada Lovelace"),
        (ALAN, "Alan Turing"),
        (GRACE, "Grace Hopper"),
        (EDSGER, "Edsger Dijkstra"),
    ] {
        db.insert_author(id, name).await.expect("insert author");
    }

    for seed in WORKS {
        let mut work = WorkRecord::new(seed.id, seed.title);
        work.abstract_text = seed.abstract_text.map(str::to_string);
        work.publication_year = Some(seed.year);
        work.work_type = Some(seed.work_type.to_string());
        work.language = Some(seed.language.to_string());
        work.reading_type = Some("open".to_string());
        work.peer_reviewed = seed.peer_reviewed;
        work.venue = seed.venue.map(str::to_string);
        db.insert_work(&work).await.expect("insert work");
        for (position, author) in seed.authors.iter().enumerate() {
            db.add_authorship(seed.id, *author, position as i32 + 1)
                .await
                .expect("insert authorship");
        }
    }

    for (citing, cited) in CITATIONS {
        db.add_citation(*citing, *cited).await.expect("insert citation");
    }

    db
}

/// Cache adapter over a fresh in-process store.
pub fn memory_cache() -> Arc<CacheAdapter> {
    Arc::new(CacheAdapter::new(
        Arc::new(MemoryStore::new(256)),
        CacheTtls::default(),
        "test",
    ))
}

/// Hit with the given id and score, other fields filled plausibly.
pub fn sample_hit(id: i64, score: f32) -> SearchHit {
    SearchHit {
        id,
        score,
        title: format!("  Work   number {}  ", id),
        snippet: Some("x".repeat(400)),
        publication_year: Some(2000 + (id % 20) as i32),
        work_type: Some("article".to_string()),
        language: Some("en".to_string()),
        venue: None,
        first_author: None,
        peer_reviewed: true,
    }
}

/// Page of `count` hits with descending scores and the given total.
pub fn sample_page(count: usize, total: u64) -> SearchPage {
    SearchPage {
        hits: (0..count)
            .map(|i| sample_hit(i as i64 + 1, 10.0 - i as f32 * 0.1))
            .collect(),
        total,
        elapsed_ms: 3,
    }
}
