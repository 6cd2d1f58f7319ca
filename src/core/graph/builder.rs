//! Network traversal
//!
//! Iterative BFS with an explicit frontier and level counter. The requested
//! depth is clamped to `[1, max_depth]`, each level expands at most
//! `max_frontier` nodes (lowest ids first) and at most `max_edges` edges are
//! returned, preferring edges closer to the seed and then heavier ones.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::config::GraphSettings;

use super::source::GraphSource;
use super::{GraphEdge, GraphError, GraphNode, Link, Network, NetworkKind, Result};

/// Hard caps on traversal size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphLimits {
    pub max_depth: u32,
    pub max_edges: usize,
    pub max_frontier: usize,
}

impl Default for GraphLimits {
    fn default() -> Self {
        Self::from(&GraphSettings::default())
    }
}

impl From<&GraphSettings> for GraphLimits {
    fn from(settings: &GraphSettings) -> Self {
        Self {
            max_depth: settings.max_depth.max(1),
            max_edges: settings.max_edges.max(1),
            max_frontier: settings.max_frontier.max(1),
        }
    }
}

pub struct GraphBuilder {
    source: Arc<dyn GraphSource>,
    limits: GraphLimits,
}

impl GraphBuilder {
    pub fn new(source: Arc<dyn GraphSource>, limits: GraphLimits) -> Self {
        Self { source, limits }
    }

    pub fn limits(&self) -> GraphLimits {
        self.limits
    }

    /// Depth actually traversed for a request.
    pub fn effective_depth(&self, requested: u32) -> u32 {
        requested.clamp(1, self.limits.max_depth)
    }

    pub async fn build(&self, kind: NetworkKind, seed: i64, requested_depth: u32) -> Result<Network> {
        let depth = self.effective_depth(requested_depth);
        if !self.source.node_exists(kind, seed).await? {
            return Err(GraphError::SeedNotFound { kind, id: seed });
        }

        let mut node_depth: BTreeMap<i64, u32> = BTreeMap::from([(seed, 0)]);
        let mut edges: BTreeMap<(i64, i64), GraphEdge> = BTreeMap::new();
        let mut frontier: BTreeSet<i64> = BTreeSet::from([seed]);
        let mut truncated = false;

        for level in 1..=depth {
            if frontier.is_empty() {
                break;
            }
            if frontier.len() > self.limits.max_frontier {
                truncated = true;
            }
            let batch: Vec<i64> = frontier.iter().copied().take(self.limits.max_frontier).collect();

            let mut links = self.source.links(kind, &batch).await?;
            // Order by (source, target) so weight ties resolve the same way on every run
            links.sort_by(|a, b| (a.source, a.target).cmp(&(b.source, b.target)));

            let mut next = BTreeSet::new();
            for link in links {
                let Some((source, target)) = orient(kind, &link) else {
                    continue;
                };
                if edges.contains_key(&(source, target)) {
                    continue;
                }
                edges.insert(
                    (source, target),
                    GraphEdge {
                        source,
                        target,
                        depth: level,
                        weight: if link.weight.is_finite() { link.weight } else { 0.0 },
                        relation: kind.relation(),
                    },
                );
                for endpoint in [source, target] {
                    if let std::collections::btree_map::Entry::Vacant(entry) = node_depth.entry(endpoint) {
                        entry.insert(level);
                        next.insert(endpoint);
                    }
                }
            }
            frontier = next;
        }

        let mut edges: Vec<GraphEdge> = edges.into_values().collect();
        edges.sort_by(edge_priority);
        if edges.len() > self.limits.max_edges {
            edges.truncate(self.limits.max_edges);
            truncated = true;
        }

        let mut kept: BTreeSet<i64> = BTreeSet::from([seed]);
        for edge in &edges {
            kept.insert(edge.source);
            kept.insert(edge.target);
        }

        let ids: Vec<i64> = kept.iter().copied().collect();
        let mut info = self.source.describe(kind, &ids).await?;
        let nodes = kept
            .into_iter()
            .filter_map(|id| node_depth.get(&id).map(|depth| (id, *depth)))
            .map(|(id, depth)| {
                let meta = info.remove(&id);
                (
                    id,
                    GraphNode {
                        id,
                        depth,
                        label: meta.as_ref().map(|m| m.label.clone()),
                        year: meta.and_then(|m| m.year),
                    },
                )
            })
            .collect();

        tracing::debug!(
            kind = %kind,
            seed,
            depth,
            edges = edges.len(),
            truncated,
            "network built"
        );

        Ok(Network {
            seed,
            kind,
            requested_depth,
            effective_depth: depth,
            nodes,
            edges,
            truncated,
        })
    }
}

/// Canonical endpoints; co-authorship is undirected. Self-loops are dropped.
fn orient(kind: NetworkKind, link: &Link) -> Option<(i64, i64)> {
    if link.source == link.target {
        return None;
    }
    match kind {
        NetworkKind::Citation => Some((link.source, link.target)),
        NetworkKind::Collaboration => Some((link.source.min(link.target), link.source.max(link.target))),
    }
}

/// Closer to the seed first, then heavier, then by endpoints.
fn edge_priority(a: &GraphEdge, b: &GraphEdge) -> Ordering {
    a.depth
        .cmp(&b.depth)
        .then_with(|| b.weight.total_cmp(&a.weight))
        .then_with(|| a.source.cmp(&b.source))
        .then_with(|| a.target.cmp(&b.target))
}
