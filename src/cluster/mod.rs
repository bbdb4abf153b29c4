//! Wallet clustering
//!
//! Heuristic predicates, the address link graph, and the breadth-first
//! cluster expander that ties them together.

pub mod expander;
pub mod graph;
pub mod heuristics;

pub use expander::{cluster_confidence, ClusterExpander, Expansion, ExpansionStats, WalletCluster};
pub use graph::{AddressGraph, GraphEdge, GraphStats};
pub use heuristics::{Candidate, HeuristicParams, HeuristicTag};
