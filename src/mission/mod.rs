//! Investigation mission: phase state machine and orchestration

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

pub mod orchestrator;

pub use orchestrator::{
    InvestigationFailure, InvestigationOutcome, InvestigationRequest, Investigator, Target,
};

/// Ordered investigation phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionPhase {
    Bootstrap = 0,
    DeployerDiscovery = 1,
    ClusterExpansion = 2,
    FundingTrace = 3,
    OverlapScan = 4,
    OffChainCorrelation = 5,
    EvidenceScoring = 6,
    ReportAssembly = 7,
}

impl MissionPhase {
    pub const ALL: [MissionPhase; 8] = [
        MissionPhase::Bootstrap,
        MissionPhase::DeployerDiscovery,
        MissionPhase::ClusterExpansion,
        MissionPhase::FundingTrace,
        MissionPhase::OverlapScan,
        MissionPhase::OffChainCorrelation,
        MissionPhase::EvidenceScoring,
        MissionPhase::ReportAssembly,
    ];

    pub fn index(&self) -> u8 {
        *self as u8
    }

    /// The phase that must follow this one
    pub fn successor(&self) -> Option<MissionPhase> {
        Self::ALL.get(self.index() as usize + 1).copied()
    }

    /// Default objective text
    pub fn objective(&self) -> &'static str {
        match self {
            MissionPhase::Bootstrap => "Bootstrap",
            MissionPhase::DeployerDiscovery => "Deployer Discovery",
            MissionPhase::ClusterExpansion => "Cluster Expansion",
            MissionPhase::FundingTrace => "Funding Trace",
            MissionPhase::OverlapScan => "Overlap Scan",
            MissionPhase::OffChainCorrelation => "Off-Chain Correlation",
            MissionPhase::EvidenceScoring => "Evidence Scoring",
            MissionPhase::ReportAssembly => "Report Assembly",
        }
    }
}

impl fmt::Display for MissionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.index(), self.objective())
    }
}

/// Progress of one investigation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionState {
    pub phase: MissionPhase,
    /// Strictly increasing, no gaps
    pub completed_phases: Vec<MissionPhase>,
    pub current_objective: String,
    /// 0 to 100, set by the scoring phase
    pub evidence_score: f64,
    /// Set once the final phase finishes
    pub complete: bool,
    pub addresses_analyzed: usize,
    pub transactions_processed: usize,
    pub provider_calls: u64,
}

impl Default for MissionState {
    fn default() -> Self {
        Self::new()
    }
}

impl MissionState {
    pub fn new() -> Self {
        Self {
            phase: MissionPhase::Bootstrap,
            completed_phases: Vec::new(),
            current_objective: MissionPhase::Bootstrap.objective().to_string(),
            evidence_score: 0.0,
            complete: false,
            addresses_analyzed: 0,
            transactions_processed: 0,
            provider_calls: 0,
        }
    }

    /// Complete the current phase and move to `next`, which must be its
    /// immediate successor
    pub fn advance(&mut self, next: MissionPhase, objective: impl Into<String>) -> Result<()> {
        let expected = self.phase.successor().ok_or(Error::PhaseOrder {
            expected: self.phase,
            got: next,
        })?;

        if self.complete || next != expected {
            return Err(Error::PhaseOrder {
                expected,
                got: next,
            });
        }

        self.completed_phases.push(self.phase);
        self.phase = next;
        self.current_objective = objective.into();
        Ok(())
    }

    /// Complete the final phase
    pub fn finish(&mut self) -> Result<()> {
        if self.phase != MissionPhase::ReportAssembly || self.complete {
            return Err(Error::PhaseOrder {
                expected: MissionPhase::ReportAssembly,
                got: self.phase,
            });
        }

        self.completed_phases.push(self.phase);
        self.complete = true;
        self.current_objective = "Complete".to_string();
        Ok(())
    }
}
