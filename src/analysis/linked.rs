//! Sender checks on linked transactions
//!
//! A linked transaction (a token gift, an initial liquidity add) signed by
//! the deployer or another cluster wallet ties that action to the cluster.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::address::Address;
use crate::chain::ChainDataProvider;
use crate::cluster::WalletCluster;
use crate::evidence::{Evidence, EvidenceType};

const DEPLOYER_MATCH_CONFIDENCE: f64 = 0.95;
const MEMBER_MATCH_CONFIDENCE: f64 = 0.85;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedTxFinding {
    pub tx_id: String,
    pub sender: Option<Address>,
    pub matched_deployer: bool,
    pub matched_cluster: bool,
}

pub struct LinkedTransactionCheck<'a> {
    provider: &'a dyn ChainDataProvider,
}

impl<'a> LinkedTransactionCheck<'a> {
    pub fn new(provider: &'a dyn ChainDataProvider) -> Self {
        Self { provider }
    }

    /// Check each transaction's sender against the deployer and the cluster.
    /// Transactions the provider cannot find are skipped.
    pub async fn check(
        &self,
        tx_ids: &[String],
        deployer: &Address,
        cluster: &WalletCluster,
    ) -> (Vec<LinkedTxFinding>, Vec<Evidence>) {
        let mut findings = Vec::new();
        let mut evidence = Vec::new();

        for tx_id in tx_ids {
            let Some(tx) = self.provider.get_transaction(tx_id).await else {
                warn!(tx_id = %tx_id, "Linked transaction not found, skipping");
                continue;
            };

            let sender = tx.sender().cloned();
            let matched_deployer = sender.as_ref() == Some(deployer);
            let matched_cluster = sender.as_ref().is_some_and(|s| cluster.contains(s));

            debug!(tx_id = %tx_id, matched_deployer, matched_cluster, "Checked linked transaction");

            if let Some(sender) = sender.as_ref().filter(|_| matched_deployer || matched_cluster) {
                let (confidence, description) = if matched_deployer {
                    (
                        DEPLOYER_MATCH_CONFIDENCE,
                        format!("Linked transaction {} signed by the deployer", tx_id),
                    )
                } else {
                    (
                        MEMBER_MATCH_CONFIDENCE,
                        format!("Linked transaction {} signed by cluster wallet {}", tx_id, sender),
                    )
                };

                evidence.push(Evidence::new(
                    EvidenceType::SenderMatch,
                    description,
                    confidence,
                    json!({
                        "tx_id": tx_id,
                        "sender": sender,
                        "deployer": deployer,
                        "tx_type": tx.tx_type,
                    }),
                ));
            }

            findings.push(LinkedTxFinding {
                tx_id: tx_id.clone(),
                sender,
                matched_deployer,
                matched_cluster,
            });
        }

        if !tx_ids.is_empty() {
            info!(
                checked = findings.len(),
                matches = evidence.len(),
                "Linked transaction check complete"
            );
        }

        (findings, evidence)
    }
}
