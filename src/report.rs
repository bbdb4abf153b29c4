//! Investigation report and dossier rendering

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

use crate::address::Address;
use crate::analysis::{
    AddressProfile, DeploymentContext, FundingOrigin, FundingSource, LinkedTxFinding,
    OverlapReport, RiskAssessment,
};
use crate::cluster::{GraphEdge, GraphStats, WalletCluster};
use crate::error::{Error, Result};
use crate::evidence::{Conclusion, EvidenceLedger, ScoreReport};
use crate::mission::orchestrator::OffChainFindings;
use crate::mission::MissionState;

/// Output format for rendered reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Markdown,
}

/// Everything an investigation produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationReport {
    pub target: String,
    pub deployer_address: Address,
    pub deploy_tx: Option<String>,
    pub cluster_size: usize,
    pub evidence_count: usize,
    /// 0 to 100
    pub confidence_score: f64,
    pub conclusion: Conclusion,
    pub evidence_breakdown: BTreeMap<String, usize>,
    pub mission_state: MissionState,

    pub cluster: WalletCluster,
    pub graph: GraphStats,
    pub graph_edges: Vec<GraphEdge>,
    /// Addresses the deployer's own history linked to
    pub deployer_links: Vec<Address>,
    pub deployer_profile: AddressProfile,
    /// Absent when the deployer was supplied directly
    pub deployment: Option<DeploymentContext>,
    pub funding_sources: Vec<FundingSource>,
    pub linked_transactions: Vec<LinkedTxFinding>,
    pub overlap: OverlapReport,
    pub off_chain: OffChainFindings,
    pub score: ScoreReport,
    pub evidence: EvidenceLedger,
    pub cache_hit_rate: f64,
    pub generated_at: DateTime<Utc>,

    /// Markdown rendering, filled in at assembly
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dossier: String,
}

impl InvestigationReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_markdown(&self) -> Result<String> {
        self.write_markdown()
            .map_err(|e| Error::Serialization(format!("markdown rendering: {}", e)))
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => self.to_json(),
            OutputFormat::Markdown if self.dossier.is_empty() => self.to_markdown(),
            OutputFormat::Markdown => Ok(self.dossier.clone()),
        }
    }

    /// Render and write to `path`, creating parent directories
    pub fn write_to(&self, path: impl AsRef<Path>, format: OutputFormat) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.render(format)?)?;
        info!(path = %path.display(), format = ?format, "Report written");
        Ok(())
    }

    fn write_markdown(&self) -> std::result::Result<String, std::fmt::Error> {
        let mut md = String::new();

        writeln!(md, "# Investigation Dossier")?;
        writeln!(md)?;
        writeln!(md, "- **Target:** {}", self.target)?;
        writeln!(md, "- **Deployer:** `{}`", self.deployer_address)?;
        if let Some(tx) = &self.deploy_tx {
            writeln!(md, "- **Deploy transaction:** `{}`", tx)?;
        }
        writeln!(md, "- **Generated:** {}", self.generated_at.to_rfc3339())?;
        writeln!(md)?;

        writeln!(md, "## Verdict")?;
        writeln!(md)?;
        writeln!(
            md,
            "**{:.1}%** - {} ({})",
            self.confidence_score,
            self.conclusion.description(),
            self.conclusion
        )?;
        writeln!(md)?;
        writeln!(md, "| Evidence type | Count |")?;
        writeln!(md, "|---|---|")?;
        for (kind, count) in &self.evidence_breakdown {
            writeln!(md, "| {} | {} |", kind, count)?;
        }
        writeln!(md)?;

        let profile = &self.deployer_profile;
        writeln!(md, "## Deployer Profile")?;
        writeln!(md)?;
        writeln!(
            md,
            "- Activity: {} ({} transactions)",
            profile.activity_level, profile.transaction_count
        )?;
        writeln!(md, "- Service type: {}", profile.service_type)?;
        write_risk(&mut md, "Risk", &profile.risk)?;
        if let Some(fc) = profile.fee_consistency {
            writeln!(md, "- Fee consistency: {:.2}", fc)?;
        }
        if let Some(fv) = profile.fee_variance {
            writeln!(md, "- Fee variance: {:.1}", fv)?;
        }
        if let Some(rf) = profile.round_number_frequency {
            writeln!(md, "- Round-number transfers: {:.0}%", rf * 100.0)?;
        }
        if let Some(ns) = profile.nonce_sequential_ratio {
            writeln!(md, "- Sequential nonces: {:.0}%", ns * 100.0)?;
        }
        writeln!(
            md,
            "- Bursts: {} (largest {})",
            profile.bursts.burst_count, profile.bursts.largest_burst
        )?;
        writeln!(md, "- Regular intervals: {}", profile.regular_intervals)?;
        if let (Some(first), Some(last)) = (profile.first_seen, profile.last_seen) {
            writeln!(md, "- Active: {} to {}", first.to_rfc3339(), last.to_rfc3339())?;
        }
        if let Some(temporal) = &profile.temporal {
            writeln!(
                md,
                "- Active periods: {} over {:.1} days (longest silence {:.1} days, {:.2} periods/day)",
                temporal.active_periods,
                temporal.total_period_days,
                temporal.longest_inactive_days,
                temporal.activity_consistency
            )?;
        }
        if let Some(hash) = &profile.source_hash {
            writeln!(md, "- Source SHA-256: `{}`", hash)?;
        }
        writeln!(md)?;

        if let Some(deployment) = &self.deployment {
            writeln!(md, "## Deployment Context")?;
            writeln!(md)?;
            if let Some(at) = deployment.deployed_at {
                let note = if deployment.unusual_hour { " (unusual hour)" } else { "" };
                writeln!(md, "- Deployed: {}{}", at.to_rfc3339(), note)?;
            }
            match deployment.block_height {
                Some(height) => writeln!(
                    md,
                    "- Block {}: {} transactions{}, {} contract deploys",
                    height,
                    deployment.block_tx_count,
                    if deployment.busy_block { " (busy)" } else { "" },
                    deployment.concurrent_deployments
                )?,
                None => writeln!(md, "- Block: unknown")?,
            }
            write_risk(&mut md, "Deployment risk", &deployment.risk)?;
            writeln!(md)?;
        }

        writeln!(md, "## Wallet Cluster")?;
        writeln!(md)?;
        writeln!(
            md,
            "{} addresses, cluster confidence {:.2}, graph {} nodes / {} edges",
            self.cluster_size,
            self.cluster.confidence_score,
            self.graph.nodes,
            self.graph.edges
        )?;
        writeln!(md)?;
        for (tag, count) in self.cluster.tag_counts() {
            writeln!(md, "- {}: {}", tag, count)?;
        }
        if !self.deployer_links.is_empty() {
            writeln!(md)?;
            writeln!(md, "Linked directly from the deployer:")?;
            writeln!(md)?;
            for address in &self.deployer_links {
                writeln!(md, "- `{}`", address)?;
            }
        }
        if !self.cluster.related_addresses.is_empty() {
            writeln!(md)?;
            writeln!(md, "Related addresses:")?;
            writeln!(md)?;
            for address in &self.cluster.related_addresses {
                writeln!(md, "- `{}`", address)?;
            }
        }
        writeln!(md)?;

        writeln!(md, "## Funding Sources")?;
        writeln!(md)?;
        if self.funding_sources.is_empty() {
            writeln!(md, "No incoming transfers found.")?;
        } else {
            writeln!(md, "| Recipient | Sender | Amount (STX) | Origin |")?;
            writeln!(md, "|---|---|---|---|")?;
            for source in &self.funding_sources {
                let origin = match &source.origin {
                    FundingOrigin::Exchange(label) => label.as_str(),
                    FundingOrigin::Operator => "operator",
                    FundingOrigin::Unknown => "-",
                };
                writeln!(
                    md,
                    "| `{}` | `{}` | {:.6} | {} |",
                    source.recipient.short(),
                    source.sender.short(),
                    source.amount as f64 / 1_000_000.0,
                    origin
                )?;
            }
        }
        writeln!(md)?;

        if !self.linked_transactions.is_empty() {
            writeln!(md, "## Linked Transactions")?;
            writeln!(md)?;
            for finding in &self.linked_transactions {
                let verdict = if finding.matched_deployer {
                    "signed by deployer"
                } else if finding.matched_cluster {
                    "signed by cluster wallet"
                } else {
                    "no match"
                };
                writeln!(md, "- `{}`: {}", finding.tx_id, verdict)?;
            }
            writeln!(md)?;
        }

        writeln!(md, "## Reference Overlap")?;
        writeln!(md)?;
        writeln!(
            md,
            "Direct contract interactions: {}; high correlation: {}",
            self.overlap.direct_overlaps.len(),
            self.overlap.high_correlation
        )?;
        for (address, score) in &self.overlap.jaccard_scores {
            writeln!(md, "- `{}` similarity {:.3}", address, score)?;
        }
        writeln!(md)?;

        writeln!(md, "## Evidence")?;
        writeln!(md)?;
        if self.evidence.is_empty() {
            writeln!(md, "No evidence recorded.")?;
        }
        for (i, evidence) in self.evidence.iter().enumerate() {
            writeln!(md, "{}. {}", i + 1, evidence)?;
        }
        writeln!(md)?;

        let state = &self.mission_state;
        writeln!(md, "## Mission")?;
        writeln!(md)?;
        writeln!(
            md,
            "Completed {} of 8 phases; {} addresses analyzed, {} transactions processed, {} provider calls (cache hit rate {:.0}%).",
            state.completed_phases.len(),
            state.addresses_analyzed,
            state.transactions_processed,
            state.provider_calls,
            self.cache_hit_rate * 100.0
        )?;

        Ok(md)
    }
}

fn write_risk(md: &mut String, label: &str, risk: &RiskAssessment) -> std::fmt::Result {
    let factors: Vec<&str> = risk.risk_factors.iter().map(|f| f.as_str()).collect();
    writeln!(
        md,
        "- {}: {} ({:.2}){}",
        label,
        risk.risk_level,
        risk.risk_score,
        if factors.is_empty() {
            String::new()
        } else {
            format!(" - {}", factors.join(", "))
        }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mission::orchestrator::fixtures::sample_report;

    #[tokio::test]
    async fn test_markdown_sections() {
        let report = sample_report().await;
        let md = report.to_markdown().unwrap();

        for heading in [
            "# Investigation Dossier",
            "## Verdict",
            "## Deployer Profile",
            "## Deployment Context",
            "## Wallet Cluster",
            "## Funding Sources",
            "## Linked Transactions",
            "## Reference Overlap",
            "## Evidence",
            "## Mission",
        ] {
            assert!(md.contains(heading), "missing {}", heading);
        }
        assert!(md.contains("signed by deployer"));
        assert!(md.contains("- Service type: individual_suspected"));
        // fees 3000, 3000, 180
        assert!(md.contains("- Risk: low (0.20) - inconsistent_fees"));
        assert!(md.contains("- Block 100: 0 transactions, 0 contract deploys"));
        assert!(md.contains("Linked directly from the deployer:"));
        assert!(md.contains("Completed 8 of 8 phases"));
    }

    #[tokio::test]
    async fn test_json_carries_summary_fields() {
        let report = sample_report().await;
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(value["conclusion"], "probable");
        assert_eq!(value["cluster_size"], 4);
        assert_eq!(value["evidence_breakdown"]["cex_funding"], 1);
        assert_eq!(value["mission_state"]["complete"], true);
        assert_eq!(value["deployer_profile"]["service_type"]["kind"], "individual_suspected");
        assert_eq!(value["deployer_profile"]["risk"]["risk_level"], "low");
        assert_eq!(value["deployment"]["block_height"], 100);
        assert_eq!(value["deployment"]["unusual_hour"], false);
        assert!(value["confidence_score"].as_f64().unwrap() <= 100.0);
    }

    #[tokio::test]
    async fn test_write_to_file() {
        let report = sample_report().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("dossier.md");

        report.write_to(&path, OutputFormat::Markdown).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, report.dossier);
    }
}
