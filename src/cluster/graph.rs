//! Address link graph
//!
//! Directed graph of addresses; an edge `a -> b` carries every heuristic tag
//! that proposed `b` while analyzing `a`. Nodes and edges are only ever added.

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use super::heuristics::HeuristicTag;
use crate::address::Address;

/// Serializable edge listing for reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: Address,
    pub to: Address,
    pub tags: BTreeSet<HeuristicTag>,
}

/// Node/edge counts for reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
}

#[derive(Debug, Default)]
pub struct AddressGraph {
    graph: StableDiGraph<Address, BTreeSet<HeuristicTag>>,
    nodes: HashMap<Address, NodeIndex>,
}

impl AddressGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `address`, inserting it if new
    pub fn ensure_node(&mut self, address: &Address) -> NodeIndex {
        if let Some(idx) = self.nodes.get(address) {
            return *idx;
        }
        let idx = self.graph.add_node(address.clone());
        self.nodes.insert(address.clone(), idx);
        idx
    }

    /// Record that `tag` linked `from` to `to`. Repeated links merge tags
    /// into the existing edge.
    pub fn add_link(&mut self, from: &Address, to: &Address, tag: HeuristicTag) {
        let a = self.ensure_node(from);
        let b = self.ensure_node(to);

        match self.graph.find_edge(a, b) {
            Some(edge) => {
                if let Some(tags) = self.graph.edge_weight_mut(edge) {
                    tags.insert(tag);
                }
            }
            None => {
                self.graph.add_edge(a, b, BTreeSet::from([tag]));
            }
        }
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.nodes.contains_key(address)
    }

    /// Tags on the edge `from -> to`
    pub fn tags(&self, from: &Address, to: &Address) -> Option<&BTreeSet<HeuristicTag>> {
        let a = *self.nodes.get(from)?;
        let b = *self.nodes.get(to)?;
        let edge = self.graph.find_edge(a, b)?;
        self.graph.edge_weight(edge)
    }

    /// Addresses directly linked from `address`
    pub fn neighbors(&self, address: &Address) -> Vec<&Address> {
        let Some(idx) = self.nodes.get(address) else {
            return Vec::new();
        };
        self.graph
            .neighbors(*idx)
            .filter_map(|n| self.graph.node_weight(n))
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            nodes: self.node_count(),
            edges: self.edge_count(),
        }
    }

    /// All edges, sorted by endpoint
    pub fn edges(&self) -> Vec<GraphEdge> {
        let mut edges: Vec<GraphEdge> = self
            .graph
            .edge_indices()
            .filter_map(|e| {
                let (a, b) = self.graph.edge_endpoints(e)?;
                Some(GraphEdge {
                    from: self.graph.node_weight(a)?.clone(),
                    to: self.graph.node_weight(b)?.clone(),
                    tags: self.graph.edge_weight(e)?.clone(),
                })
            })
            .collect();
        edges.sort_by(|x, y| (&x.from, &x.to).cmp(&(&y.from, &y.to)));
        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u32) -> Address {
        Address::parse(&format!("SP{:0>39}", n)).unwrap()
    }

    #[test]
    fn test_links_merge_tags() {
        let mut graph = AddressGraph::new();
        graph.add_link(&addr(1), &addr(2), HeuristicTag::FeePatternSimilarity);
        graph.add_link(&addr(1), &addr(2), HeuristicTag::TimingCorrelation);
        graph.add_link(&addr(1), &addr(2), HeuristicTag::TimingCorrelation);

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.tags(&addr(1), &addr(2)).unwrap().len(), 2);
        // directed
        assert!(graph.tags(&addr(2), &addr(1)).is_none());
    }

    #[test]
    fn test_edges_listing_and_neighbors() {
        let mut graph = AddressGraph::new();
        graph.add_link(&addr(3), &addr(1), HeuristicTag::CommonInputOwnership);
        graph.add_link(&addr(1), &addr(2), HeuristicTag::RoundNumberTransfer);
        graph.add_link(&addr(1), &addr(3), HeuristicTag::RoundNumberTransfer);

        let edges = graph.edges();
        assert_eq!(edges.len(), 3);
        assert_eq!(edges[0].from, addr(1));
        assert_eq!(edges[2].from, addr(3));

        let mut neighbors = graph.neighbors(&addr(1));
        neighbors.sort();
        assert_eq!(neighbors, vec![&addr(2), &addr(3)]);
        assert!(graph.neighbors(&addr(9)).is_empty());
        assert_eq!(graph.stats(), GraphStats { nodes: 3, edges: 3 });
    }
}
