//! Graph Builder
//!
//! Bounded breadth-first construction of citation and collaboration networks
//! around a seed node.
//!
//! - `source` - where links and node metadata come from
//! - `builder` - the traversal, depth clamp and edge cap

pub mod builder;
pub mod source;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use builder::{GraphBuilder, GraphLimits};
pub use source::{GraphSource, SqlGraphSource};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("{kind} seed {id} not found")]
    SeedNotFound { kind: NetworkKind, id: i64 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, GraphError>;

// ============================================================================
// Network Types
// ============================================================================

/// Which network to build. Citation networks are over works, collaboration
/// networks over authors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    Citation,
    Collaboration,
}

impl NetworkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkKind::Citation => "citation",
            NetworkKind::Collaboration => "collaboration",
        }
    }

    pub fn relation(&self) -> RelationKind {
        match self {
            NetworkKind::Citation => RelationKind::Cites,
            NetworkKind::Collaboration => RelationKind::CoAuthor,
        }
    }
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationKind {
    /// Directed: `source` cites `target`.
    Cites,
    /// Undirected: stored with `source < target`.
    CoAuthor,
}

/// A raw link as reported by a [`GraphSource`].
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub source: i64,
    pub target: i64,
    pub weight: f64,
}

impl Link {
    pub fn new(source: i64, target: i64, weight: f64) -> Self {
        Self {
            source,
            target,
            weight,
        }
    }
}

/// Display metadata for a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub label: String,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: i64,
    /// Hops from the seed at which the node was first reached.
    pub depth: u32,
    pub label: Option<String>,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: i64,
    pub target: i64,
    /// Traversal level at which the edge was found.
    pub depth: u32,
    pub weight: f64,
    pub relation: RelationKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub seed: i64,
    pub kind: NetworkKind,
    pub requested_depth: u32,
    pub effective_depth: u32,
    pub nodes: BTreeMap<i64, GraphNode>,
    pub edges: Vec<GraphEdge>,
    /// Edges or frontier nodes were dropped by a cap.
    pub truncated: bool,
}
