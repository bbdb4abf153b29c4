//! Overlap between the cluster and a reference wallet set
//!
//! Two signals:
//! 1. direct: cluster wallets appearing as callers in reference contract events
//! 2. indirect: Jaccard similarity of counterparty sets

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

use crate::address::{Address, ContractId};
use crate::chain::{ChainDataProvider, EventRecord, TransactionRecord};
use crate::cluster::WalletCluster;
use crate::config::OverlapConfig;
use crate::evidence::{Evidence, EvidenceType};

/// `|a ∩ b| / |a ∪ b|`, or 0 when both sets are empty
pub fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Addresses `address` sent to or received from
pub fn counterparties(address: &Address, txs: &[TransactionRecord]) -> BTreeSet<Address> {
    let mut partners = BTreeSet::new();
    for tx in txs {
        for party in [tx.sender(), tx.recipient()].into_iter().flatten() {
            if party != address {
                partners.insert(party.clone());
            }
        }
    }
    partners
}

/// A cluster wallet calling a reference contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectOverlap {
    pub cluster_address: Address,
    pub contract: String,
    pub tx_id: Option<String>,
    pub event_type: Option<String>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverlapReport {
    pub direct_overlaps: Vec<DirectOverlap>,
    /// Reference address -> Jaccard score
    pub jaccard_scores: BTreeMap<Address, f64>,
    pub high_correlation: bool,
    #[serde(skip)]
    pub evidence: Vec<Evidence>,
}

impl OverlapReport {
    pub fn max_similarity(&self) -> f64 {
        self.jaccard_scores.values().copied().fold(0.0, f64::max)
    }
}

pub struct OverlapAnalyzer<'a> {
    provider: &'a dyn ChainDataProvider,
    config: &'a OverlapConfig,
}

impl<'a> OverlapAnalyzer<'a> {
    pub fn new(provider: &'a dyn ChainDataProvider, config: &'a OverlapConfig) -> Self {
        Self { provider, config }
    }

    pub async fn analyze(
        &self,
        cluster: &WalletCluster,
        reference: &BTreeSet<Address>,
    ) -> OverlapReport {
        let mut report = OverlapReport::default();

        self.scan_contracts(cluster, &mut report).await;

        if !reference.is_empty() {
            let cluster_partners = self.cluster_counterparties(cluster).await;
            for reference_address in reference {
                let txs = self
                    .provider
                    .get_transactions(reference_address, self.config.sample_size, 0)
                    .await;
                let partners = counterparties(reference_address, &txs);
                let score = jaccard(&cluster_partners, &partners);

                debug!(reference = %reference_address.short(), score, "Counterparty similarity");
                report.jaccard_scores.insert(reference_address.clone(), score);
            }
        }

        report.high_correlation = !report.direct_overlaps.is_empty()
            || report.max_similarity() > self.config.jaccard_threshold;

        info!(
            direct = report.direct_overlaps.len(),
            references = report.jaccard_scores.len(),
            max_similarity = %format!("{:.3}", report.max_similarity()),
            high_correlation = report.high_correlation,
            "Overlap scan complete"
        );

        report
    }

    async fn scan_contracts(&self, cluster: &WalletCluster, report: &mut OverlapReport) {
        let mut resolved: HashMap<String, Option<Address>> = HashMap::new();

        for raw in &self.config.contracts {
            let contract = match ContractId::parse(raw) {
                Ok(c) => c,
                Err(e) => {
                    warn!(contract = %raw, error = %e, "Skipping reference contract");
                    continue;
                }
            };

            let events = self
                .provider
                .get_contract_events(&contract, self.config.event_limit)
                .await;
            debug!(contract = %contract, events = events.len(), "Scanning contract events");

            for event in &events {
                let Some(caller) = self.event_caller(event, &mut resolved).await else {
                    continue;
                };
                if !cluster.contains(&caller) {
                    continue;
                }

                let overlap = DirectOverlap {
                    cluster_address: caller,
                    contract: contract.to_string(),
                    tx_id: event.transaction_id().map(str::to_string),
                    event_type: event.event_type.clone(),
                    timestamp: event
                        .tx
                        .as_ref()
                        .and_then(|t| t.burn_block_time_iso.clone()),
                };

                report.evidence.push(Evidence::new(
                    EvidenceType::ContractInteraction,
                    format!(
                        "Cluster wallet {} interacted with {}",
                        overlap.cluster_address, overlap.contract
                    ),
                    self.config.confidence,
                    json!(overlap),
                ));
                report.direct_overlaps.push(overlap);
            }
        }
    }

    /// Embedded caller, else the resolved transaction sender (each tx id at most once)
    async fn event_caller(
        &self,
        event: &EventRecord,
        resolved: &mut HashMap<String, Option<Address>>,
    ) -> Option<Address> {
        if let Some(caller) = event.caller() {
            return Some(caller.clone());
        }
        if !self.config.resolve_event_callers {
            return None;
        }

        let tx_id = event.transaction_id()?;
        if let Some(sender) = resolved.get(tx_id) {
            return sender.clone();
        }

        let sender = self
            .provider
            .get_transaction(tx_id)
            .await
            .and_then(|tx| tx.sender_address);
        resolved.insert(tx_id.to_string(), sender.clone());
        sender
    }

    /// Union of per-member counterparty samples
    async fn cluster_counterparties(&self, cluster: &WalletCluster) -> BTreeSet<Address> {
        let mut partners = BTreeSet::new();
        for member in cluster.members() {
            let txs = self
                .provider
                .get_transactions(member, self.config.sample_size, 0)
                .await;
            partners.extend(counterparties(member, &txs));
        }
        partners
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::addr;
    use crate::chain::types::EventTx;
    use crate::chain::MemoryProvider;

    const DAO: &str = "SP2C2YFP12AJZB4MABJBAJ55XECVS7E4PMMZ89YZR.arkadiko-dao";

    fn cluster(primary: &Address, related: &[Address]) -> WalletCluster {
        WalletCluster {
            primary_address: primary.clone(),
            related_addresses: related.iter().cloned().collect(),
            confidence_score: 0.0,
            heuristics: Vec::new(),
            first_seen: None,
            last_seen: None,
        }
    }

    fn event(tx_id: &str, sender: Option<&Address>) -> EventRecord {
        EventRecord {
            event_index: Some(0),
            event_type: Some("smart_contract_log".into()),
            tx_id: Some(tx_id.into()),
            tx: sender.map(|s| EventTx {
                tx_id: Some(tx_id.into()),
                sender_address: Some(s.clone()),
                burn_block_time_iso: None,
            }),
        }
    }

    fn config() -> OverlapConfig {
        OverlapConfig {
            contracts: vec![DAO.to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_jaccard_properties() {
        let a: BTreeSet<u32> = [1, 2, 3].into();
        let b: BTreeSet<u32> = [2, 3, 4, 5].into();
        let empty = BTreeSet::new();

        assert_eq!(jaccard(&a, &b), jaccard(&b, &a));
        assert!((jaccard(&a, &b) - 0.4).abs() < 1e-12);
        assert_eq!(jaccard(&a, &a), 1.0);
        assert_eq!(jaccard(&empty, &empty), 0.0);
        assert_eq!(jaccard(&a, &empty), 0.0);
    }

    #[test]
    fn test_counterparties_exclude_self() {
        let (a, b, c) = (addr(1), addr(2), addr(3));
        let txs = vec![
            TransactionRecord::transfer("0x1", &a, &b, 1, 1, 1),
            TransactionRecord::transfer("0x2", &c, &a, 1, 1, 1),
            TransactionRecord::call("0x3", &a, DAO, 1, 1),
        ];
        assert_eq!(counterparties(&a, &txs), BTreeSet::from([b, c]));
    }

    #[tokio::test]
    async fn test_direct_overlap_with_caller_resolution() {
        let (primary, member, outsider) = (addr(1), addr(2), addr(3));
        let dao = ContractId::parse(DAO).unwrap();
        let provider = MemoryProvider::new()
            .with_events(
                &dao,
                vec![
                    event("0xa", Some(&member)),
                    event("0xb", Some(&outsider)),
                    // caller only reachable through the transaction
                    event("0xc", None),
                    event("0xc", None),
                ],
            )
            .with_transaction(TransactionRecord::call("0xc", &primary, DAO, 1, 1));

        let config = config();
        let report = OverlapAnalyzer::new(&provider, &config)
            .analyze(&cluster(&primary, &[member.clone()]), &BTreeSet::new())
            .await;

        assert_eq!(report.direct_overlaps.len(), 3);
        assert_eq!(report.evidence.len(), 3);
        assert!(report
            .evidence
            .iter()
            .all(|e| e.evidence_type == EvidenceType::ContractInteraction && e.confidence == 0.6));
        assert!(report.high_correlation);
        // one events fetch, one transaction lookup for 0xc
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_resolution_disabled() {
        let primary = addr(1);
        let dao = ContractId::parse(DAO).unwrap();
        let provider = MemoryProvider::new()
            .with_events(&dao, vec![event("0xc", None)])
            .with_transaction(TransactionRecord::call("0xc", &primary, DAO, 1, 1));

        let config = OverlapConfig {
            resolve_event_callers: false,
            ..config()
        };
        let report = OverlapAnalyzer::new(&provider, &config)
            .analyze(&cluster(&primary, &[]), &BTreeSet::new())
            .await;

        assert!(report.direct_overlaps.is_empty());
        assert!(!report.high_correlation);
    }

    #[tokio::test]
    async fn test_similarity_drives_high_correlation() {
        let (primary, reference, shared_a, shared_b, other) =
            (addr(1), addr(10), addr(20), addr(21), addr(22));
        let provider = MemoryProvider::new()
            .with_history(
                primary.clone(),
                vec![
                    TransactionRecord::transfer("0x1", &primary, &shared_a, 1, 1, 1),
                    TransactionRecord::transfer("0x2", &shared_b, &primary, 1, 1, 2),
                ],
            )
            .with_history(
                reference.clone(),
                vec![
                    TransactionRecord::transfer("0x3", &reference, &shared_a, 1, 1, 1),
                    TransactionRecord::transfer("0x4", &reference, &shared_b, 1, 1, 2),
                    TransactionRecord::transfer("0x5", &reference, &other, 1, 1, 3),
                ],
            );

        let config = OverlapConfig {
            contracts: Vec::new(),
            ..Default::default()
        };
        let report = OverlapAnalyzer::new(&provider, &config)
            .analyze(&cluster(&primary, &[]), &BTreeSet::from([reference.clone()]))
            .await;

        // {a, b} vs {a, b, other}
        assert!((report.jaccard_scores[&reference] - 2.0 / 3.0).abs() < 1e-12);
        assert!(report.direct_overlaps.is_empty());
        assert!(report.high_correlation);
    }

    #[tokio::test]
    async fn test_no_reference_data() {
        let provider = MemoryProvider::new();
        let config = config();
        let report = OverlapAnalyzer::new(&provider, &config)
            .analyze(&cluster(&addr(1), &[]), &BTreeSet::from([addr(10)]))
            .await;

        assert_eq!(report.jaccard_scores[&addr(10)], 0.0);
        assert!(!report.high_correlation);
    }
}
