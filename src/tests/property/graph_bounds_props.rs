//! Property-based tests for network traversal bounds
//!
//! Tests invariants:
//! - No edge is deeper than the effective depth
//! - Edge count never exceeds the configured cap
//! - The seed is always present at depth 0
//! - Every edge endpoint is a returned node
//! - Truncation is reported whenever a cap bites

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use proptest::prelude::*;

use crate::core::graph::{
    GraphBuilder, GraphLimits, GraphSource, Link, NetworkKind, NodeInfo, Result as GraphResult,
};

/// Random directed graph held in memory.
struct EdgeListSource {
    nodes: BTreeSet<i64>,
    links: Vec<Link>,
}

#[async_trait]
impl GraphSource for EdgeListSource {
    async fn node_exists(&self, _kind: NetworkKind, id: i64) -> GraphResult<bool> {
        Ok(self.nodes.contains(&id))
    }

    async fn links(&self, _kind: NetworkKind, frontier: &[i64]) -> GraphResult<Vec<Link>> {
        Ok(self
            .links
            .iter()
            .filter(|l| frontier.contains(&l.source) || frontier.contains(&l.target))
            .cloned()
            .collect())
    }

    async fn describe(&self, _kind: NetworkKind, ids: &[i64]) -> GraphResult<HashMap<i64, NodeInfo>> {
        Ok(ids
            .iter()
            .filter(|id| self.nodes.contains(id))
            .map(|id| {
                (
                    *id,
                    NodeInfo {
                        label: format!("node {}", id),
                        year: None,
                    },
                )
            })
            .collect())
    }
}

// ============================================================================
// Strategies
// ============================================================================

fn arb_links() -> impl Strategy<Value = Vec<(i64, i64, u8)>> {
    prop::collection::vec((0i64..40, 0i64..40, 1u8..5), 0..150)
}

fn arb_limits() -> impl Strategy<Value = GraphLimits> {
    (1u32..5, 1usize..60, 1usize..20).prop_map(|(max_depth, max_edges, max_frontier)| GraphLimits {
        max_depth,
        max_edges,
        max_frontier,
    })
}

fn build(
    links: Vec<(i64, i64, u8)>,
    limits: GraphLimits,
    kind: NetworkKind,
    seed: i64,
    depth: u32,
) -> crate::core::graph::Network {
    let source = EdgeListSource {
        nodes: (0..40).collect(),
        links: links
            .into_iter()
            .map(|(s, t, w)| Link::new(s, t, f64::from(w)))
            .collect(),
    };
    let builder = GraphBuilder::new(Arc::new(source), limits);
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(builder.build(kind, seed, depth))
        .unwrap()
}

proptest! {
    /// Property: traversal respects every configured bound
    #[test]
    fn prop_network_is_bounded(
        links in arb_links(),
        limits in arb_limits(),
        seed in 0i64..40,
        depth in 0u32..8,
    ) {
        let network = build(links, limits, NetworkKind::Citation, seed, depth);

        prop_assert!(network.effective_depth >= 1);
        prop_assert!(network.effective_depth <= limits.max_depth);
        prop_assert!(network.edges.len() <= limits.max_edges);
        prop_assert!(network.edges.iter().all(|e| e.depth >= 1 && e.depth <= network.effective_depth));
        prop_assert!(network.nodes.values().all(|n| n.depth <= network.effective_depth));
        prop_assert_eq!(network.nodes.get(&seed).map(|n| n.depth), Some(0));
    }

    /// Property: edges only reference returned nodes and never repeat
    #[test]
    fn prop_edges_reference_nodes(
        links in arb_links(),
        limits in arb_limits(),
        seed in 0i64..40,
    ) {
        let network = build(links, limits, NetworkKind::Collaboration, seed, limits.max_depth);

        let mut seen = BTreeSet::new();
        for edge in &network.edges {
            prop_assert!(network.nodes.contains_key(&edge.source));
            prop_assert!(network.nodes.contains_key(&edge.target));
            prop_assert!(edge.source < edge.target, "co-author edges are canonical");
            prop_assert!(seen.insert((edge.source, edge.target)), "duplicate edge");
        }
    }

    /// Property: an untruncated build is never larger than its caps and a
    /// generous cap never truncates a small graph
    #[test]
    fn prop_truncation_reported(links in arb_links(), seed in 0i64..40) {
        let generous = GraphLimits { max_depth: 3, max_edges: 1_000, max_frontier: 1_000 };
        let full = build(links.clone(), generous, NetworkKind::Citation, seed, 3);
        prop_assert!(!full.truncated);

        let tight = GraphLimits { max_depth: 3, max_edges: 5, max_frontier: 1_000 };
        let capped = build(links, tight, NetworkKind::Citation, seed, 3);
        prop_assert_eq!(capped.truncated, full.edges.len() > 5);
        prop_assert_eq!(capped.edges.len(), full.edges.len().min(5));
    }
}
