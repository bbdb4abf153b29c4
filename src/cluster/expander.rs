//! Wallet cluster expansion
//!
//! Grows a cluster outward from a seed address:
//! - fetch the history of each queued address (one provider call each)
//! - run every heuristic over it
//! - link proposed candidates in the graph and queue them for the next hop
//!
//! Traversal is breadth-first, bounded by `max_hops` and by a hard cap on the
//! number of analyzed addresses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

use super::graph::AddressGraph;
use super::heuristics::{self, HeuristicParams, HeuristicTag};
use crate::address::Address;
use crate::chain::ChainDataProvider;
use crate::config::ClusteringConfig;

/// Cluster of addresses believed to share an owner with the primary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletCluster {
    pub primary_address: Address,
    /// Never contains `primary_address`
    pub related_addresses: BTreeSet<Address>,
    /// 0.0 to 1.0
    pub confidence_score: f64,
    /// One entry per (related candidate, tag) link
    pub heuristics: Vec<HeuristicTag>,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl WalletCluster {
    /// Primary plus related addresses
    pub fn size(&self) -> usize {
        self.related_addresses.len() + 1
    }

    pub fn contains(&self, address: &Address) -> bool {
        *address == self.primary_address || self.related_addresses.contains(address)
    }

    /// Primary first, then related in order
    pub fn members(&self) -> impl Iterator<Item = &Address> {
        std::iter::once(&self.primary_address).chain(self.related_addresses.iter())
    }

    pub fn distinct_tags(&self) -> BTreeSet<HeuristicTag> {
        self.heuristics.iter().copied().collect()
    }

    pub fn tag_counts(&self) -> BTreeMap<HeuristicTag, usize> {
        let mut counts = BTreeMap::new();
        for tag in &self.heuristics {
            *counts.entry(*tag).or_insert(0) += 1;
        }
        counts
    }
}

/// Confidence that the related addresses share an owner with the primary.
///
/// Size contributes 0.1 per related address up to 0.5; each distinct tag
/// adds its weight once regardless of how often it fired.
pub fn cluster_confidence(related: usize, tags: &BTreeSet<HeuristicTag>) -> f64 {
    let base = (related as f64 * 0.1).min(0.5);
    let bonus: f64 = tags.iter().map(|t| t.weight()).sum();
    (base + bonus).min(1.0)
}

/// Traversal counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionStats {
    pub visited: usize,
    pub transactions_processed: usize,
    pub provider_calls: usize,
    /// Stopped on the visited cap with work still queued
    pub capped: bool,
}

/// Output of one expansion run
#[derive(Debug)]
pub struct Expansion {
    pub cluster: WalletCluster,
    pub graph: AddressGraph,
    pub stats: ExpansionStats,
}

/// Cluster expansion engine
pub struct ClusterExpander {
    provider: Arc<dyn ChainDataProvider>,
    params: HeuristicParams,
    tx_limit: u32,
    max_visited: usize,
}

impl ClusterExpander {
    pub fn new(provider: Arc<dyn ChainDataProvider>, config: &ClusteringConfig) -> Self {
        Self {
            provider,
            params: HeuristicParams::from(config),
            tx_limit: config.tx_limit,
            max_visited: config.max_visited.max(1),
        }
    }

    /// Expand a cluster around `seed`
    pub async fn expand(&self, seed: &Address, max_hops: u32) -> Expansion {
        let mut graph = AddressGraph::new();
        graph.ensure_node(seed);

        let mut queue: VecDeque<(Address, u32)> = VecDeque::from([(seed.clone(), 0)]);
        let mut queued: HashSet<Address> = HashSet::from([seed.clone()]);
        let mut visited: HashSet<Address> = HashSet::new();

        let mut related = BTreeSet::new();
        let mut tags = Vec::new();
        let mut first_seen: Option<DateTime<Utc>> = None;
        let mut last_seen: Option<DateTime<Utc>> = None;
        let mut stats = ExpansionStats::default();

        while visited.len() < self.max_visited {
            let Some((address, hop)) = queue.pop_front() else {
                break;
            };
            queued.remove(&address);

            if visited.contains(&address) || hop > max_hops {
                continue;
            }
            visited.insert(address.clone());

            let txs = self
                .provider
                .get_transactions(&address, self.tx_limit, 0)
                .await;
            stats.provider_calls += 1;
            stats.transactions_processed += txs.len();

            debug!(address = %address.short(), hop, txs = txs.len(), "Analyzing address");

            for ts in txs.iter().filter_map(|tx| tx.block_time()) {
                first_seen = Some(first_seen.map_or(ts, |f| f.min(ts)));
                last_seen = Some(last_seen.map_or(ts, |l| l.max(ts)));
            }

            let mut seen = HashSet::new();
            for (candidate, tag) in heuristics::apply_all(&address, &txs, &self.params) {
                if !seen.insert((candidate.clone(), tag)) {
                    continue;
                }

                graph.add_link(&address, &candidate, tag);

                if candidate != *seed {
                    related.insert(candidate.clone());
                    tags.push(tag);
                }

                if hop < max_hops && !visited.contains(&candidate) && !queued.contains(&candidate)
                {
                    queued.insert(candidate.clone());
                    queue.push_back((candidate, hop + 1));
                }
            }
        }

        stats.visited = visited.len();
        stats.capped = !queue.is_empty();

        let distinct: BTreeSet<HeuristicTag> = tags.iter().copied().collect();
        let confidence = cluster_confidence(related.len(), &distinct);

        info!(
            seed = %seed,
            related = related.len(),
            visited = stats.visited,
            edges = graph.edge_count(),
            confidence = %format!("{:.2}", confidence),
            capped = stats.capped,
            "Cluster expansion complete"
        );

        Expansion {
            cluster: WalletCluster {
                primary_address: seed.clone(),
                related_addresses: related,
                confidence_score: confidence,
                heuristics: tags,
                first_seen,
                last_seen,
            },
            graph,
            stats,
        }
    }
}
