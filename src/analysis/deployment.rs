//! Deployment context of a contract
//!
//! Looks at when and where the deploy transaction landed: the UTC hour, how
//! busy its block was, and how many contracts were deployed in the same
//! block. The deployer's own profile feeds into the risk score.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::profile::{ActivityLevel, AddressProfile, RiskAssessment, RiskFactor};
use crate::chain::{ChainDataProvider, TransactionRecord, TxType};

/// Listing depth for the deploy block
const BLOCK_TX_LIMIT: u32 = 200;
/// Blocks with more transactions than this count as busy
const BUSY_BLOCK_TXS: usize = 100;
/// Usual deployment hours (UTC), inclusive
const FIRST_USUAL_HOUR: u32 = 6;
const LAST_USUAL_HOUR: u32 = 22;
const HIGH_RISK_DEPLOYER_SCORE: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentContext {
    pub deploy_tx: String,
    pub deployed_at: Option<DateTime<Utc>>,
    pub block_height: Option<u64>,
    pub unusual_hour: bool,
    /// Transactions listed for the deploy block
    pub block_tx_count: usize,
    pub busy_block: bool,
    /// Smart-contract deploys in the block, this one included
    pub concurrent_deployments: usize,
    pub risk: RiskAssessment,
}

pub struct DeploymentAnalyzer<'a> {
    provider: &'a dyn ChainDataProvider,
}

impl<'a> DeploymentAnalyzer<'a> {
    pub fn new(provider: &'a dyn ChainDataProvider) -> Self {
        Self { provider }
    }

    /// `block_height` falls back to the contract record when the deploy
    /// transaction does not carry one. No height means no block context.
    pub async fn analyze(
        &self,
        deploy_tx: &str,
        deploy: &TransactionRecord,
        block_height: Option<u64>,
        deployer: &AddressProfile,
    ) -> DeploymentContext {
        let block_height = deploy.block_height.or(block_height);
        let block = match block_height {
            Some(height) => self.provider.get_block_transactions(height, BLOCK_TX_LIMIT).await,
            None => Vec::new(),
        };

        let deployed_at = deploy.block_time();
        let unusual_hour = deployed_at
            .is_some_and(|t| !(FIRST_USUAL_HOUR..=LAST_USUAL_HOUR).contains(&t.hour()));
        let busy_block = block.len() > BUSY_BLOCK_TXS;
        let concurrent_deployments = block
            .iter()
            .filter(|tx| tx.tx_type == Some(TxType::SmartContract))
            .count();

        let mut factors = Vec::new();
        if unusual_hour {
            factors.push(RiskFactor::UnusualDeploymentTime);
        }
        if busy_block {
            factors.push(RiskFactor::DeployedInBusyBlock);
        }
        if deployer.risk.risk_score > HIGH_RISK_DEPLOYER_SCORE {
            factors.push(RiskFactor::HighRiskDeployer);
        }
        if deployer.activity_level == ActivityLevel::VeryHigh {
            factors.push(RiskFactor::VeryActiveDeployer);
        }

        debug!(
            tx_id = deploy_tx,
            block_height,
            block_txs = block.len(),
            concurrent_deployments,
            unusual_hour,
            "Deployment context"
        );

        DeploymentContext {
            deploy_tx: deploy_tx.to_string(),
            deployed_at,
            block_height,
            unusual_hour,
            block_tx_count: block.len(),
            busy_block,
            concurrent_deployments,
            risk: RiskAssessment::from_factors(factors),
        }
    }
}
