//! Evidence records and the append-only ledger
//!
//! Every analysis phase reports its findings as [`Evidence`]. The ledger only
//! grows; the [`scorer`] reduces it to a single percentage and conclusion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod scorer;

pub use scorer::{Conclusion, ScoreReport, Scorer};

/// Classes of evidence
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EvidenceType {
    /// Cluster funded by a known exchange wallet
    CexFunding,
    /// Cluster funded by a reference or watched wallet
    OperatorFunding,
    /// Cluster member called a reference protocol contract
    ContractInteraction,
    FeePattern,
    Stylometry,
    TimingCorrelation,
    /// Linked transaction signed by the deployer or a cluster member
    SenderMatch,
    Custom(String),
}

impl EvidenceType {
    pub fn as_str(&self) -> &str {
        match self {
            EvidenceType::CexFunding => "cex_funding",
            EvidenceType::OperatorFunding => "operator_funding",
            EvidenceType::ContractInteraction => "contract_interaction",
            EvidenceType::FeePattern => "fee_pattern",
            EvidenceType::Stylometry => "stylometry",
            EvidenceType::TimingCorrelation => "timing_correlation",
            EvidenceType::SenderMatch => "sender_match",
            EvidenceType::Custom(name) => name,
        }
    }

    /// Default scoring weight (points at full confidence)
    pub fn default_weight(&self) -> Option<f64> {
        match self {
            EvidenceType::CexFunding => Some(40.0),
            EvidenceType::OperatorFunding => Some(25.0),
            EvidenceType::ContractInteraction => Some(25.0),
            EvidenceType::FeePattern => Some(15.0),
            EvidenceType::Stylometry => Some(10.0),
            EvidenceType::TimingCorrelation => Some(10.0),
            EvidenceType::SenderMatch => Some(50.0),
            EvidenceType::Custom(_) => None,
        }
    }
}

impl From<String> for EvidenceType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "cex_funding" => EvidenceType::CexFunding,
            "operator_funding" => EvidenceType::OperatorFunding,
            "contract_interaction" | "arkadiko_interaction" => EvidenceType::ContractInteraction,
            "fee_pattern" => EvidenceType::FeePattern,
            "stylometry" => EvidenceType::Stylometry,
            "timing_correlation" => EvidenceType::TimingCorrelation,
            "sender_match" => EvidenceType::SenderMatch,
            _ => EvidenceType::Custom(name),
        }
    }
}

impl From<EvidenceType> for String {
    fn from(t: EvidenceType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for EvidenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub evidence_type: EvidenceType,
    pub description: String,
    /// 0.0 to 1.0
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub source_data: serde_json::Value,
}

impl Evidence {
    /// Create a new piece of evidence; confidence is clamped to [0, 1]
    pub fn new(
        evidence_type: EvidenceType,
        description: impl Into<String>,
        confidence: f64,
        source_data: serde_json::Value,
    ) -> Self {
        Self {
            evidence_type,
            description: description.into(),
            confidence: if confidence.is_nan() {
                0.0
            } else {
                confidence.clamp(0.0, 1.0)
            },
            timestamp: Utc::now(),
            source_data,
        }
    }
}

impl fmt::Display for Evidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (conf: {:.2}) - {}",
            self.evidence_type, self.confidence, self.description
        )
    }
}

/// Ordered, append-only evidence collection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceLedger {
    items: Vec<Evidence>,
}

impl EvidenceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, evidence: Evidence) {
        self.items.push(evidence);
    }

    pub fn extend(&mut self, evidence: impl IntoIterator<Item = Evidence>) {
        self.items.extend(evidence);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Evidence> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Evidence] {
        &self.items
    }

    /// Count per evidence type
    pub fn breakdown(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for e in &self.items {
            *counts.entry(e.evidence_type.to_string()).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_confidence_clamped() {
        let high = Evidence::new(EvidenceType::FeePattern, "x", 1.7, json!({}));
        let low = Evidence::new(EvidenceType::FeePattern, "x", -0.2, json!({}));
        let nan = Evidence::new(EvidenceType::FeePattern, "x", f64::NAN, json!({}));
        assert_eq!(high.confidence, 1.0);
        assert_eq!(low.confidence, 0.0);
        assert_eq!(nan.confidence, 0.0);
    }

    #[test]
    fn test_type_names_roundtrip() {
        for t in [
            EvidenceType::CexFunding,
            EvidenceType::OperatorFunding,
            EvidenceType::ContractInteraction,
            EvidenceType::FeePattern,
            EvidenceType::Stylometry,
            EvidenceType::TimingCorrelation,
            EvidenceType::SenderMatch,
            EvidenceType::Custom("github_commit".into()),
        ] {
            let json = serde_json::to_string(&t).unwrap();
            let back: EvidenceType = serde_json::from_str(&json).unwrap();
            assert_eq!(back, t);
        }

        assert_eq!(
            EvidenceType::from("arkadiko_interaction".to_string()),
            EvidenceType::ContractInteraction
        );
        assert_eq!(EvidenceType::Custom("x".into()).default_weight(), None);
    }

    #[test]
    fn test_ledger_breakdown() {
        let mut ledger = EvidenceLedger::new();
        ledger.record(Evidence::new(EvidenceType::CexFunding, "a", 0.8, json!({})));
        ledger.record(Evidence::new(EvidenceType::CexFunding, "b", 0.8, json!({})));
        ledger.record(Evidence::new(EvidenceType::SenderMatch, "c", 0.95, json!({})));

        assert_eq!(ledger.len(), 3);
        let breakdown = ledger.breakdown();
        assert_eq!(breakdown["cex_funding"], 2);
        assert_eq!(breakdown["sender_match"], 1);
        // insertion order preserved
        assert_eq!(ledger.as_slice()[2].description, "c");
    }
}
