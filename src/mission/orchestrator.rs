//! Investigation orchestrator
//!
//! Runs the eight mission phases in order over a memoizing view of the chain
//! provider. Any failure before scoring aborts the run with the failing phase
//! and the mission state at that point. Cancellation is checked only between
//! phases.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{MissionPhase, MissionState};
use crate::address::{Address, ContractId};
use crate::analysis::{
    profile_address, AddressProfile, DeploymentAnalyzer, DeploymentContext, FundingTracer,
    LinkedTransactionCheck, LookupTables, OverlapAnalyzer,
};
use crate::chain::{CachedProvider, ChainDataProvider};
use crate::cluster::{ClusterExpander, Expansion, HeuristicTag};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::evidence::{Evidence, EvidenceLedger, EvidenceType, Scorer};
use crate::report::InvestigationReport;

/// What to investigate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Target {
    /// Resolve the deployer through the contract's deploy transaction
    Contract(ContractId),
    /// Deployer already known
    Deployer(Address),
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Contract(id) => write!(f, "contract {}", id),
            Target::Deployer(address) => write!(f, "deployer {}", address),
        }
    }
}

/// Caller input; validated during bootstrap
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvestigationRequest {
    /// `<address>.<contract-name>`
    #[serde(default)]
    pub contract: Option<String>,
    #[serde(default)]
    pub deployer: Option<String>,
    #[serde(default)]
    pub reference_wallets: Vec<String>,
    #[serde(default)]
    pub watch_wallets: Vec<String>,
    /// Transactions whose sender should be checked against the cluster
    #[serde(default)]
    pub linked_transactions: Vec<String>,
    /// Overrides `clustering.max_hops`
    #[serde(default)]
    pub max_hops: Option<u32>,
}

impl InvestigationRequest {
    pub fn for_contract(contract: impl Into<String>) -> Self {
        Self {
            contract: Some(contract.into()),
            ..Default::default()
        }
    }

    pub fn for_deployer(deployer: impl Into<String>) -> Self {
        Self {
            deployer: Some(deployer.into()),
            ..Default::default()
        }
    }

    /// Exactly one of contract or deployer must be given
    pub fn target(&self) -> Result<Target> {
        match (self.contract.as_deref(), self.deployer.as_deref()) {
            (Some(contract), None) => Ok(Target::Contract(ContractId::parse(contract)?)),
            (None, Some(deployer)) => Ok(Target::Deployer(Address::parse(deployer)?)),
            (Some(_), Some(_)) => Err(Error::InvalidRequest(
                "give either a contract id or a deployer address, not both".into(),
            )),
            (None, None) => Err(Error::InvalidRequest(
                "a contract id or a deployer address is required".into(),
            )),
        }
    }
}

/// Why and where a run stopped
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("investigation failed in phase {phase}: {cause}")]
pub struct InvestigationFailure {
    pub phase: MissionPhase,
    pub cause: String,
    pub mission_state: MissionState,
}

pub type InvestigationOutcome = std::result::Result<InvestigationReport, InvestigationFailure>;

/// Off-chain correlation results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OffChainFindings {
    pub sources_checked: Vec<String>,
    pub matches: Vec<Evidence>,
}

/// Deployer resolution result
struct Discovery {
    deployer: Address,
    deploy_tx: Option<String>,
    profile: AddressProfile,
    deployment: Option<DeploymentContext>,
}

/// Mutable state of one run
struct Run {
    state: MissionState,
    ledger: EvidenceLedger,
    cache: Arc<CachedProvider>,
}

impl Run {
    /// Check for cancellation, then move to `next`
    fn enter(&mut self, next: MissionPhase, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled(next));
        }
        self.state.advance(next, next.objective())?;
        self.state.provider_calls = self.cache.upstream_calls();
        info!(phase = %next, "Entering phase");
        Ok(())
    }
}

/// Runs investigations against a chain provider
#[derive(Clone)]
pub struct Investigator {
    provider: Arc<dyn ChainDataProvider>,
    config: Arc<Config>,
}

impl Investigator {
    pub fn new(provider: Arc<dyn ChainDataProvider>, config: Arc<Config>) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run a full investigation
    pub async fn run(
        &self,
        request: &InvestigationRequest,
        cancel: &CancellationToken,
    ) -> InvestigationOutcome {
        let mut run = Run {
            state: MissionState::new(),
            ledger: EvidenceLedger::new(),
            cache: Arc::new(CachedProvider::new(self.provider.clone())),
        };

        match self.execute(&mut run, request, cancel).await {
            Ok(report) => Ok(report),
            Err(e) => {
                let phase = match &e {
                    Error::Cancelled(next) => *next,
                    _ => run.state.phase,
                };
                run.state.provider_calls = run.cache.upstream_calls();
                warn!(phase = %phase, error = %e, "Investigation aborted");
                Err(InvestigationFailure {
                    phase,
                    cause: e.to_string(),
                    mission_state: run.state,
                })
            }
        }
    }

    async fn execute(
        &self,
        run: &mut Run,
        request: &InvestigationRequest,
        cancel: &CancellationToken,
    ) -> Result<InvestigationReport> {
        let config = &self.config;

        // Phase 0: bootstrap
        if cancel.is_cancelled() {
            return Err(Error::Cancelled(MissionPhase::Bootstrap));
        }
        info!(phase = %MissionPhase::Bootstrap, "Entering phase");
        let target = request.target()?;
        let tables =
            LookupTables::build(config, &request.reference_wallets, &request.watch_wallets)?;
        let max_hops = request.max_hops.unwrap_or(config.clustering.max_hops);
        info!(
            target = %target,
            reference = tables.reference.len(),
            watch = tables.watch.len(),
            service_tags = tables.service_tags.len(),
            max_hops,
            "Investigation bootstrapped"
        );

        // Phase 1: deployer discovery
        run.enter(MissionPhase::DeployerDiscovery, cancel)?;
        let discovery = self.discover_deployer(&*run.cache, &target, &tables).await?;
        let deployer = discovery.deployer.clone();

        // Phase 2: cluster expansion
        run.enter(MissionPhase::ClusterExpansion, cancel)?;
        let expander = ClusterExpander::new(run.cache.clone(), &config.clustering);
        let Expansion {
            cluster,
            graph,
            stats,
        } = expander.expand(&deployer, max_hops).await;
        run.state.addresses_analyzed = stats.visited;
        run.state.transactions_processed += stats.transactions_processed;
        if config.clustering.emit_evidence {
            run.ledger.extend(behavioral_evidence(&cluster.distinct_tags(), cluster.confidence_score));
        }

        // Phase 3: funding trace and linked transactions
        run.enter(MissionPhase::FundingTrace, cancel)?;
        let funding = FundingTracer::new(&*run.cache, &tables, &config.funding)
            .trace(&cluster)
            .await;
        run.ledger.extend(funding.evidence.iter().cloned());
        let (linked, linked_evidence) = LinkedTransactionCheck::new(&*run.cache)
            .check(&request.linked_transactions, &deployer, &cluster)
            .await;
        run.ledger.extend(linked_evidence);

        // Phase 4: overlap scan
        run.enter(MissionPhase::OverlapScan, cancel)?;
        let overlap = OverlapAnalyzer::new(&*run.cache, &config.overlap)
            .analyze(&cluster, &tables.reference)
            .await;
        run.ledger.extend(overlap.evidence.iter().cloned());

        // Phase 5: off-chain correlation
        run.enter(MissionPhase::OffChainCorrelation, cancel)?;
        let off_chain = correlate_off_chain(&deployer);
        run.ledger.extend(off_chain.matches.iter().cloned());

        // Phase 6: scoring
        run.enter(MissionPhase::EvidenceScoring, cancel)?;
        let score = Scorer::new(&config.scoring).score(run.ledger.as_slice());
        run.state.evidence_score = score.total_score;
        info!(
            score = %format!("{:.1}", score.total_score),
            conclusion = %score.conclusion,
            evidence = run.ledger.len(),
            "Evidence scored"
        );

        // Phase 7: report assembly
        run.enter(MissionPhase::ReportAssembly, cancel)?;
        run.state.provider_calls = run.cache.upstream_calls();
        run.state.finish()?;

        let mut deployer_links: Vec<Address> =
            graph.neighbors(&deployer).into_iter().cloned().collect();
        deployer_links.sort();

        let mut report = InvestigationReport {
            target: target.to_string(),
            deployer_address: deployer,
            deploy_tx: discovery.deploy_tx,
            cluster_size: cluster.size(),
            evidence_count: run.ledger.len(),
            confidence_score: score.total_score,
            conclusion: score.conclusion,
            evidence_breakdown: run.ledger.breakdown(),
            mission_state: run.state.clone(),
            graph: graph.stats(),
            graph_edges: graph.edges(),
            deployer_links,
            cluster,
            deployer_profile: discovery.profile,
            deployment: discovery.deployment,
            funding_sources: funding.sources,
            linked_transactions: linked,
            overlap,
            off_chain,
            score,
            evidence: run.ledger.clone(),
            cache_hit_rate: run.cache.stats().hit_rate(),
            generated_at: Utc::now(),
            dossier: String::new(),
        };
        report.dossier = report.to_markdown()?;

        info!(
            deployer = %report.deployer_address,
            cluster_size = report.cluster_size,
            score = %format!("{:.1}", report.confidence_score),
            conclusion = %report.conclusion,
            provider_calls = report.mission_state.provider_calls,
            "Investigation complete"
        );

        Ok(report)
    }

    async fn discover_deployer(
        &self,
        provider: &dyn ChainDataProvider,
        target: &Target,
        tables: &LookupTables,
    ) -> Result<Discovery> {
        let (deployer, deploy, source) = match target {
            Target::Deployer(address) => {
                debug!(deployer = %address, "Deployer supplied, skipping contract lookup");
                (address.clone(), None, None)
            }
            Target::Contract(contract_id) => {
                let contract = provider
                    .get_contract_info(contract_id)
                    .await
                    .ok_or_else(|| Error::ContractNotFound(contract_id.to_string()))?;

                let tx_id = contract.tx_id.clone().ok_or_else(|| {
                    Error::TransactionNotFound(format!("deploy transaction of {}", contract_id))
                })?;
                let deploy = provider
                    .get_transaction(&tx_id)
                    .await
                    .ok_or_else(|| Error::TransactionNotFound(tx_id.clone()))?;
                let deployer = deploy
                    .sender()
                    .cloned()
                    .ok_or_else(|| Error::DeployerMissing(tx_id.clone()))?;

                let source = contract
                    .source_code
                    .clone()
                    .or_else(|| deploy.source_code().map(str::to_string));

                info!(contract = %contract_id, deployer = %deployer, tx_id = %tx_id, "Deployer resolved");
                (deployer, Some((tx_id, deploy, contract.block_height)), source)
            }
        };

        let mut profile =
            profile_address(provider, &deployer, self.config.clustering.profile_tx_limit)
                .await
                .with_service_label(tables.service_label(&deployer));
        if let Some(source) = source.as_deref() {
            profile = profile.with_source(source);
        }

        let mut deployment = None;
        if let Some((tx_id, record, block_height)) = &deploy {
            profile = profile.with_deploy_tx(tx_id.as_str());
            deployment = Some(
                DeploymentAnalyzer::new(provider)
                    .analyze(tx_id, record, *block_height, &profile)
                    .await,
            );
        }

        info!(
            deployer = %deployer,
            activity = %profile.activity_level,
            service = %profile.service_type,
            risk = %profile.risk.risk_level,
            txs = profile.transaction_count,
            bursts = profile.bursts.burst_count,
            "Deployer profiled"
        );

        Ok(Discovery {
            deployer,
            deploy_tx: deploy.map(|(tx_id, _, _)| tx_id),
            profile,
            deployment,
        })
    }
}

/// Evidence for the behavioral heuristics that fired during expansion
fn behavioral_evidence(tags: &BTreeSet<HeuristicTag>, confidence: f64) -> Vec<Evidence> {
    tags.iter()
        .filter_map(|tag| {
            let evidence_type = match tag {
                HeuristicTag::FeePatternSimilarity => EvidenceType::FeePattern,
                HeuristicTag::TimingCorrelation => EvidenceType::TimingCorrelation,
                _ => return None,
            };
            Some(Evidence::new(
                evidence_type,
                format!("Cluster linked by {}", tag),
                confidence,
                json!({ "heuristic": tag, "cluster_confidence": confidence }),
            ))
        })
        .collect()
}

/// Off-chain sources (code hosting, chat, stylometry) are not wired up;
/// the phase always reports no findings.
fn correlate_off_chain(deployer: &Address) -> OffChainFindings {
    debug!(deployer = %deployer.short(), "Off-chain correlation has no sources configured");
    OffChainFindings::default()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::chain::{ContractRecord, MemoryProvider, TransactionRecord, TxType};

    pub fn addr(n: u32) -> Address {
        Address::parse(&format!("SP{:0>39}", n)).unwrap()
    }

    pub fn contract_id() -> ContractId {
        ContractId::parse(&format!("{}.welshcorgicoin-token", addr(1))).unwrap()
    }

    /// Deployer (1) funded by an exchange wallet, sends round STX to (2),
    /// and shares a fee with (3); the gift tx is signed by the deployer
    pub fn provider(config: &Config) -> MemoryProvider {
        let deployer = addr(1);
        let (r, t) = (addr(2), addr(3));
        let exchange = Address::from_chain(
            config
                .service_tags
                .keys()
                .min()
                .cloned()
                .unwrap_or_default(),
        );

        let deploy = TransactionRecord {
            tx_id: Some("0xdeploy".into()),
            tx_type: Some(TxType::SmartContract),
            sender_address: Some(deployer.clone()),
            fee_rate: Some(1_000),
            burn_block_time: Some(1_699_000_000),
            ..Default::default()
        };

        MemoryProvider::new()
            .with_contract(
                &contract_id(),
                ContractRecord {
                    contract_id: Some(contract_id().to_string()),
                    tx_id: Some("0xdeploy".into()),
                    block_height: Some(100),
                    source_code: Some("(define-fungible-token welshcorgicoin)".into()),
                    canonical: Some(true),
                },
            )
            .with_transaction(deploy)
            .with_transaction(TransactionRecord::transfer(
                "0xgift", &deployer, &r, 1_000_000_000, 3_000, 1_700_000_500,
            ))
            .with_history(
                deployer.clone(),
                vec![
                    TransactionRecord::transfer("0x1", &deployer, &r, 2_000_000, 3_000, 1_700_000_000),
                    TransactionRecord::call("0x2", &t, "SP000.pool", 3_000, 1_700_100_000),
                    TransactionRecord::transfer("0x3", &exchange, &deployer, 50_000_000, 180, 1_698_000_000),
                ],
            )
    }

    pub fn request() -> InvestigationRequest {
        InvestigationRequest {
            contract: Some(contract_id().to_string()),
            reference_wallets: vec![addr(40).to_string()],
            linked_transactions: vec!["0xgift".into()],
            max_hops: Some(1),
            ..Default::default()
        }
    }

    pub async fn sample_report() -> InvestigationReport {
        let config = Arc::new(Config::default());
        let investigator = Investigator::new(Arc::new(provider(&config)), config);
        match investigator.run(&request(), &CancellationToken::new()).await {
            Ok(report) => report,
            Err(failure) => panic!("{}", failure),
        }
    }
}
