//! Funding-source trace
//!
//! Scans the incoming STX transfers of every cluster member. Each transfer is
//! recorded; transfers from exchange wallets or operator wallets also become
//! evidence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::LookupTables;
use crate::address::Address;
use crate::chain::ChainDataProvider;
use crate::cluster::WalletCluster;
use crate::config::FundingConfig;
use crate::evidence::{Evidence, EvidenceType};

/// Classification of a funding sender
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "label", rename_all = "snake_case")]
pub enum FundingOrigin {
    /// Known exchange wallet
    Exchange(String),
    /// Reference or watched wallet
    Operator,
    Unknown,
}

/// One incoming transfer to a cluster member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingSource {
    pub recipient: Address,
    pub sender: Address,
    /// micro-STX
    pub amount: u64,
    pub tx_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub origin: FundingOrigin,
}

impl FundingSource {
    pub fn is_exchange(&self) -> bool {
        matches!(self.origin, FundingOrigin::Exchange(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundingTrace {
    pub sources: Vec<FundingSource>,
    #[serde(skip)]
    pub evidence: Vec<Evidence>,
}

impl FundingTrace {
    pub fn exchange_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.is_exchange()).count()
    }

    pub fn operator_sources(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| s.origin == FundingOrigin::Operator)
            .count()
    }
}

pub struct FundingTracer<'a> {
    provider: &'a dyn ChainDataProvider,
    tables: &'a LookupTables,
    tx_limit: u32,
    confidence: f64,
}

impl<'a> FundingTracer<'a> {
    pub fn new(
        provider: &'a dyn ChainDataProvider,
        tables: &'a LookupTables,
        config: &FundingConfig,
    ) -> Self {
        Self {
            provider,
            tables,
            tx_limit: config.tx_limit,
            confidence: config.confidence,
        }
    }

    fn classify(&self, sender: &Address) -> FundingOrigin {
        if let Some(label) = self.tables.service_label(sender) {
            FundingOrigin::Exchange(label.to_string())
        } else if self.tables.is_operator(sender) {
            FundingOrigin::Operator
        } else {
            FundingOrigin::Unknown
        }
    }

    /// Trace funding for the primary and every related address
    pub async fn trace(&self, cluster: &WalletCluster) -> FundingTrace {
        let mut trace = FundingTrace::default();

        for member in cluster.members() {
            let txs = self
                .provider
                .get_transactions(member, self.tx_limit, 0)
                .await;

            for tx in txs.iter().filter(|tx| tx.is_token_transfer()) {
                let (Some(sender), Some(recipient)) = (tx.sender(), tx.recipient()) else {
                    continue;
                };
                if recipient != member {
                    continue;
                }

                let source = FundingSource {
                    recipient: member.clone(),
                    sender: sender.clone(),
                    amount: tx.amount().unwrap_or(0),
                    tx_id: tx.tx_id.clone(),
                    timestamp: tx.block_time(),
                    origin: self.classify(sender),
                };

                let finding = match &source.origin {
                    FundingOrigin::Exchange(label) => Some((
                        EvidenceType::CexFunding,
                        format!("Exchange withdrawal from {} to cluster wallet", label),
                    )),
                    FundingOrigin::Operator => Some((
                        EvidenceType::OperatorFunding,
                        format!("Operator wallet {} funded cluster wallet", sender),
                    )),
                    FundingOrigin::Unknown => None,
                };

                if let Some((evidence_type, description)) = finding {
                    debug!(
                        sender = %sender,
                        recipient = %member,
                        kind = %evidence_type,
                        "Flagged funding source"
                    );
                    trace.evidence.push(Evidence::new(
                        evidence_type,
                        description,
                        self.confidence,
                        json!(source),
                    ));
                }

                trace.sources.push(source);
            }
        }

        info!(
            members = cluster.size(),
            sources = trace.sources.len(),
            exchange = trace.exchange_sources(),
            operator = trace.operator_sources(),
            "Funding trace complete"
        );

        trace
    }
}
