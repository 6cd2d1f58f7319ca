pub mod logging;

// Category-aware result cache (Redis or in-process LRU)
pub mod cache;

// Primary engine, fallback store and the orchestrator in front of them
pub mod search;

// Citation and collaboration networks
pub mod graph;

// Composition root
pub mod service;
