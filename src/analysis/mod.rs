//! Cluster analyses that turn chain data into evidence
//!
//! - `profile`: behavioral metrics for a single address
//! - `deployment`: timing and block context of a contract deploy
//! - `funding`: provenance of incoming transfers
//! - `linked`: sender checks on caller-supplied transactions
//! - `overlap`: reference contract interactions and counterparty similarity

use std::collections::{BTreeSet, HashMap};

use crate::address::Address;
use crate::config::Config;
use crate::error::Result;

pub mod deployment;
pub mod funding;
pub mod linked;
pub mod overlap;
pub mod profile;

pub use deployment::{DeploymentAnalyzer, DeploymentContext};
pub use funding::{FundingOrigin, FundingSource, FundingTrace, FundingTracer};
pub use linked::{LinkedTransactionCheck, LinkedTxFinding};
pub use overlap::{jaccard, DirectOverlap, OverlapAnalyzer, OverlapReport};
pub use profile::{
    profile_address, ActivityLevel, AddressProfile, BurstActivity, RiskAssessment, RiskFactor,
    RiskLevel, ServiceType, TemporalPatterns,
};

/// Address lookup tables built once per investigation
#[derive(Debug, Clone, Default)]
pub struct LookupTables {
    /// Known service wallets (exchanges) and their labels
    pub service_tags: HashMap<Address, String>,
    /// Reference (operator) wallets
    pub reference: BTreeSet<Address>,
    /// Additional wallets under watch
    pub watch: BTreeSet<Address>,
}

impl LookupTables {
    /// Validate caller-supplied wallets and merge them with configured service tags
    pub fn build(config: &Config, reference: &[String], watch: &[String]) -> Result<Self> {
        let reference = reference
            .iter()
            .map(|a| Address::parse(a))
            .collect::<Result<BTreeSet<_>>>()?;
        let watch = watch
            .iter()
            .map(|a| Address::parse(a))
            .collect::<Result<BTreeSet<_>>>()?;

        let service_tags = config
            .service_tags
            .iter()
            .map(|(address, label)| Ok((Address::parse(address)?, label.clone())))
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(Self {
            service_tags,
            reference,
            watch,
        })
    }

    pub fn service_label(&self, address: &Address) -> Option<&str> {
        self.service_tags.get(address).map(String::as_str)
    }

    /// Reference or watched wallet
    pub fn is_operator(&self, address: &Address) -> bool {
        self.reference.contains(address) || self.watch.contains(address)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::addr;
    use super::*;

    #[test]
    fn test_build_tables() {
        let config = Config::default();
        let tables = LookupTables::build(
            &config,
            &[addr(1).to_string()],
            &[addr(2).to_string(), addr(3).to_string()],
        )
        .unwrap();

        assert!(tables.is_operator(&addr(1)));
        assert!(tables.is_operator(&addr(3)));
        assert!(!tables.is_operator(&addr(4)));
        assert_eq!(tables.service_tags.len(), config.service_tags.len());
    }

    #[test]
    fn test_lower_case_wallets_match_chain_form() {
        let mut config = Config::default();
        let upper = addr(7).to_string();
        config
            .service_tags
            .insert(upper.to_ascii_lowercase(), "Lowercase Exchange".into());
        let tables =
            LookupTables::build(&config, &[upper.to_ascii_lowercase()], &[]).unwrap();

        let on_chain = Address::from_chain(upper);
        assert!(tables.reference.contains(&on_chain));
        assert_eq!(tables.service_label(&on_chain), Some("Lowercase Exchange"));
    }

    #[test]
    fn test_invalid_wallet_rejected() {
        let err = LookupTables::build(&Config::default(), &["SPXYZ".to_string()], &[]).unwrap_err();
        assert!(err.is_validation());
    }
}
