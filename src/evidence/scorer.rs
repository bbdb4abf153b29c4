//! Weighted evidence scoring
//!
//! Each piece of evidence contributes `weight[type] * confidence` points; the
//! total is capped at 100 and mapped onto a conclusion ladder.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use super::{Evidence, EvidenceType};
use crate::config::ScoringConfig;

/// Final verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    Probable,
    Possible,
    Insufficient,
}

impl Conclusion {
    pub fn description(&self) -> &'static str {
        match self {
            Conclusion::Probable => "Probable founder",
            Conclusion::Possible => "Possible connection",
            Conclusion::Insufficient => "Insufficient evidence",
        }
    }
}

impl fmt::Display for Conclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Conclusion::Probable => "probable",
            Conclusion::Possible => "possible",
            Conclusion::Insufficient => "insufficient",
        };
        f.write_str(label)
    }
}

/// Points contributed by one piece of evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub evidence_type: EvidenceType,
    pub weight: f64,
    pub confidence: f64,
    pub points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    /// 0 to 100
    pub total_score: f64,
    pub conclusion: Conclusion,
    /// Sum of contributions before the cap
    pub raw_points: f64,
    pub contributions: Vec<Contribution>,
    pub weights: BTreeMap<String, f64>,
}

pub struct Scorer {
    weights: HashMap<EvidenceType, f64>,
    default_weight: f64,
    probable_threshold: f64,
    possible_threshold: f64,
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(&ScoringConfig::default())
    }
}

impl Scorer {
    pub fn new(config: &ScoringConfig) -> Self {
        let mut weights: HashMap<EvidenceType, f64> = [
            EvidenceType::CexFunding,
            EvidenceType::OperatorFunding,
            EvidenceType::ContractInteraction,
            EvidenceType::FeePattern,
            EvidenceType::Stylometry,
            EvidenceType::TimingCorrelation,
            EvidenceType::SenderMatch,
        ]
        .into_iter()
        .filter_map(|t| t.default_weight().map(|w| (t, w)))
        .collect();

        for (name, weight) in &config.weights {
            weights.insert(EvidenceType::from(name.clone()), *weight);
        }

        Self {
            weights,
            default_weight: config.default_weight,
            probable_threshold: config.probable_threshold,
            possible_threshold: config.possible_threshold,
        }
    }

    pub fn weight(&self, evidence_type: &EvidenceType) -> f64 {
        self.weights
            .get(evidence_type)
            .copied()
            .unwrap_or(self.default_weight)
    }

    pub fn conclusion(&self, score: f64) -> Conclusion {
        if score >= self.probable_threshold {
            Conclusion::Probable
        } else if score >= self.possible_threshold {
            Conclusion::Possible
        } else {
            Conclusion::Insufficient
        }
    }

    /// Score a set of evidence. The result does not depend on input order:
    /// contributions are summed in ascending order of points.
    pub fn score(&self, evidence: &[Evidence]) -> ScoreReport {
        let contributions: Vec<Contribution> = evidence
            .iter()
            .map(|e| {
                let weight = self.weight(&e.evidence_type);
                Contribution {
                    evidence_type: e.evidence_type.clone(),
                    weight,
                    confidence: e.confidence,
                    points: weight * e.confidence,
                }
            })
            .collect();

        let mut points: Vec<f64> = contributions.iter().map(|c| c.points).collect();
        points.sort_by(|a, b| a.total_cmp(b));
        let raw_points: f64 = points.iter().sum();

        let total_score = raw_points.clamp(0.0, 100.0);
        let conclusion = self.conclusion(total_score);

        ScoreReport {
            total_score,
            conclusion,
            raw_points,
            contributions,
            weights: self
                .weights
                .iter()
                .map(|(t, w)| (t.to_string(), *w))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ev(t: EvidenceType, confidence: f64) -> Evidence {
        Evidence::new(t, "test", confidence, json!({}))
    }

    #[test]
    fn test_sum_85_is_probable() {
        // 40 + 25 + 15 + 5 (unknown type)
        let evidence = vec![
            ev(EvidenceType::CexFunding, 1.0),
            ev(EvidenceType::ContractInteraction, 1.0),
            ev(EvidenceType::FeePattern, 1.0),
            ev(EvidenceType::Custom("anything".into()), 1.0),
        ];
        let report = Scorer::default().score(&evidence);
        assert_eq!(report.total_score, 85.0);
        assert_eq!(report.conclusion, Conclusion::Probable);
    }

    #[test]
    fn test_cap_at_100() {
        let evidence = vec![ev(EvidenceType::SenderMatch, 1.0); 5];
        let report = Scorer::default().score(&evidence);
        assert_eq!(report.total_score, 100.0);
        assert_eq!(report.raw_points, 250.0);
    }

    #[test]
    fn test_conclusion_ladder() {
        let scorer = Scorer::default();
        assert_eq!(scorer.conclusion(70.0), Conclusion::Probable);
        assert_eq!(scorer.conclusion(69.99), Conclusion::Possible);
        assert_eq!(scorer.conclusion(40.0), Conclusion::Possible);
        assert_eq!(scorer.conclusion(39.9), Conclusion::Insufficient);
        assert_eq!(Scorer::default().score(&[]).conclusion, Conclusion::Insufficient);
    }

    #[test]
    fn test_order_independent() {
        let evidence = vec![
            ev(EvidenceType::CexFunding, 0.8),
            ev(EvidenceType::ContractInteraction, 0.6),
            ev(EvidenceType::FeePattern, 0.65),
            ev(EvidenceType::TimingCorrelation, 0.35),
            ev(EvidenceType::OperatorFunding, 0.8),
            ev(EvidenceType::Custom("x".into()), 0.1),
        ];
        let forward = Scorer::default().score(&evidence).total_score;

        let mut reversed = evidence.clone();
        reversed.reverse();
        let mut rotated = evidence.clone();
        rotated.rotate_left(2);

        assert_eq!(
            Scorer::default().score(&reversed).total_score.to_bits(),
            forward.to_bits()
        );
        assert_eq!(
            Scorer::default().score(&rotated).total_score.to_bits(),
            forward.to_bits()
        );
    }

    #[test]
    fn test_config_overrides() {
        let mut config = ScoringConfig::default();
        config.weights.insert("cex_funding".into(), 10.0);
        config.weights.insert("github_commit".into(), 30.0);
        config.default_weight = 1.0;
        let scorer = Scorer::new(&config);

        assert_eq!(scorer.weight(&EvidenceType::CexFunding), 10.0);
        assert_eq!(scorer.weight(&EvidenceType::Custom("github_commit".into())), 30.0);
        assert_eq!(scorer.weight(&EvidenceType::Custom("other".into())), 1.0);
        assert_eq!(scorer.weight(&EvidenceType::SenderMatch), 50.0);
    }
}
