//! In-crate test suites
//!
//! - `common` - seeded corpus and sample pages
//! - `orchestrator_tests` - fallback, caching and facet composition with mock backends
//! - `property` - proptest suites for the query escaper and graph bounds

pub mod common;

mod property;
