//! Clustering heuristics
//!
//! Each heuristic is a pure function over one address's transaction history
//! and proposes `(candidate, tag)` pairs. Duplicates are allowed; the
//! expander deduplicates. Records with missing fields simply produce no
//! candidates.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::address::Address;
use crate::chain::TransactionRecord;

/// Heuristic that linked two addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeuristicTag {
    /// Sender funded the analyzed address
    CommonInputOwnership,
    /// Round-valued transfer out of the analyzed address
    RoundNumberTransfer,
    /// Transactions from different senders within the timing window
    TimingCorrelation,
    /// Distinct senders paying an identical fee
    FeePatternSimilarity,
}

impl HeuristicTag {
    pub const ALL: [HeuristicTag; 4] = [
        HeuristicTag::CommonInputOwnership,
        HeuristicTag::RoundNumberTransfer,
        HeuristicTag::TimingCorrelation,
        HeuristicTag::FeePatternSimilarity,
    ];

    /// Contribution of this tag to cluster confidence
    pub fn weight(&self) -> f64 {
        match self {
            HeuristicTag::CommonInputOwnership => 0.30,
            HeuristicTag::RoundNumberTransfer => 0.20,
            HeuristicTag::TimingCorrelation => 0.15,
            HeuristicTag::FeePatternSimilarity => 0.25,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HeuristicTag::CommonInputOwnership => "common_input_ownership",
            HeuristicTag::RoundNumberTransfer => "round_number_transfer",
            HeuristicTag::TimingCorrelation => "timing_correlation",
            HeuristicTag::FeePatternSimilarity => "fee_pattern_similarity",
        }
    }
}

impl fmt::Display for HeuristicTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A proposed link from the analyzed address
pub type Candidate = (Address, HeuristicTag);

/// Tunables shared by all heuristics
#[derive(Debug, Clone)]
pub struct HeuristicParams {
    pub timing_window_secs: i64,
    pub round_unit: u64,
    pub max_timing_pairs: usize,
}

impl Default for HeuristicParams {
    fn default() -> Self {
        Self {
            timing_window_secs: 300,
            round_unit: 1_000_000,
            max_timing_pairs: 10_000,
        }
    }
}

impl From<&crate::config::ClusteringConfig> for HeuristicParams {
    fn from(config: &crate::config::ClusteringConfig) -> Self {
        Self {
            timing_window_secs: config.timing_window_secs,
            round_unit: config.round_unit,
            max_timing_pairs: config.max_timing_pairs,
        }
    }
}

/// Run every heuristic over one history
pub fn apply_all(
    address: &Address,
    txs: &[TransactionRecord],
    params: &HeuristicParams,
) -> Vec<Candidate> {
    let mut out = common_input_ownership(address, txs);
    out.extend(round_number_transfer(address, txs, params.round_unit));
    out.extend(timing_correlation(
        address,
        txs,
        params.timing_window_secs,
        params.max_timing_pairs,
    ));
    out.extend(fee_pattern_similarity(address, txs));
    out
}

/// Senders of positive-amount token transfers into `address`
pub fn common_input_ownership(address: &Address, txs: &[TransactionRecord]) -> Vec<Candidate> {
    txs.iter()
        .filter(|tx| tx.is_token_transfer())
        .filter(|tx| tx.amount().is_some_and(|a| a > 0))
        .filter(|tx| tx.recipient() == Some(address))
        .filter_map(|tx| tx.sender())
        .filter(|sender| *sender != address)
        .map(|sender| (sender.clone(), HeuristicTag::CommonInputOwnership))
        .collect()
}

/// Recipients of transfers that are exact multiples of `unit`
pub fn round_number_transfer(
    address: &Address,
    txs: &[TransactionRecord],
    unit: u64,
) -> Vec<Candidate> {
    if unit == 0 {
        return Vec::new();
    }

    txs.iter()
        .filter(|tx| tx.amount().is_some_and(|a| a > 0 && a % unit == 0))
        .filter_map(|tx| tx.recipient())
        .filter(|recipient| *recipient != address)
        .map(|recipient| (recipient.clone(), HeuristicTag::RoundNumberTransfer))
        .collect()
}

/// Senders of transactions whose block times differ by less than `window`.
///
/// Sort-and-sweep: after sorting by time only the transactions inside the
/// window ahead of each entry are compared. At most `max_pairs` pairs are
/// examined.
pub fn timing_correlation(
    address: &Address,
    txs: &[TransactionRecord],
    window: i64,
    max_pairs: usize,
) -> Vec<Candidate> {
    let mut timed: Vec<(i64, &Address)> = txs
        .iter()
        .filter_map(|tx| Some((tx.timestamp()?, tx.sender()?)))
        .collect();
    timed.sort_by_key(|(ts, _)| *ts);

    let mut out = Vec::new();
    let mut examined = 0usize;

    'sweep: for (i, (t1, s1)) in timed.iter().enumerate() {
        for (t2, s2) in &timed[i + 1..] {
            if t2.saturating_sub(*t1) >= window {
                break;
            }
            if examined >= max_pairs {
                break 'sweep;
            }
            examined += 1;

            if s1 == s2 {
                continue;
            }
            for sender in [*s1, *s2] {
                if sender != address {
                    out.push((sender.clone(), HeuristicTag::TimingCorrelation));
                }
            }
        }
    }

    out
}

/// Senders sharing an identical non-zero fee with at least one other sender
pub fn fee_pattern_similarity(address: &Address, txs: &[TransactionRecord]) -> Vec<Candidate> {
    let mut by_fee: BTreeMap<u64, BTreeSet<&Address>> = BTreeMap::new();
    for tx in txs {
        if let (Some(fee), Some(sender)) = (tx.fee(), tx.sender()) {
            if fee > 0 {
                by_fee.entry(fee).or_default().insert(sender);
            }
        }
    }

    by_fee
        .values()
        .filter(|senders| senders.len() >= 2)
        .flat_map(|senders| senders.iter())
        .filter(|sender| **sender != address)
        .map(|sender| ((*sender).clone(), HeuristicTag::FeePatternSimilarity))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u32) -> Address {
        Address::parse(&format!("SP{:0>39}", n)).unwrap()
    }

    fn tags(candidates: &[Candidate]) -> BTreeSet<HeuristicTag> {
        candidates.iter().map(|(_, t)| *t).collect()
    }

    #[test]
    fn test_tag_serialization_names() {
        for tag in HeuristicTag::ALL {
            let json = serde_json::to_string(&tag).unwrap();
            assert_eq!(json, format!("\"{}\"", tag.as_str()));
        }
        let total: f64 = HeuristicTag::ALL.iter().map(|t| t.weight()).sum();
        assert!((total - 0.90).abs() < 1e-12);
    }

    #[test]
    fn test_common_input_ownership() {
        let me = addr(1);
        let funder = addr(2);
        let txs = vec![
            TransactionRecord::transfer("a", &funder, &me, 500, 10, 0),
            // zero amount
            TransactionRecord::transfer("b", &addr(3), &me, 0, 10, 1000),
            // outgoing
            TransactionRecord::transfer("c", &me, &addr(4), 500, 10, 2000),
            // self transfer
            TransactionRecord::transfer("d", &me, &me, 500, 10, 3000),
        ];

        let out = common_input_ownership(&me, &txs);
        assert_eq!(out, vec![(funder, HeuristicTag::CommonInputOwnership)]);
    }

    #[test]
    fn test_round_number_transfer() {
        let me = addr(1);
        let txs = vec![
            TransactionRecord::transfer("a", &me, &addr(2), 2_000_000, 10, 0),
            TransactionRecord::transfer("b", &me, &addr(3), 2_500_000, 10, 0),
            // round but incoming to the analyzed address
            TransactionRecord::transfer("c", &addr(4), &me, 1_000_000, 10, 0),
        ];

        let out = round_number_transfer(&me, &txs, 1_000_000);
        assert_eq!(out, vec![(addr(2), HeuristicTag::RoundNumberTransfer)]);
        assert!(round_number_transfer(&me, &txs, 0).is_empty());
    }

    #[test]
    fn test_timing_correlation_window() {
        let me = addr(1);
        let txs = vec![
            TransactionRecord::call("a", &addr(2), "x.y", 1, 1_000),
            TransactionRecord::call("b", &addr(3), "x.y", 2, 1_299),
            // exactly one window after b
            TransactionRecord::call("c", &addr(4), "x.y", 3, 1_599),
        ];

        let out = timing_correlation(&me, &txs, 300, usize::MAX);
        let found: BTreeSet<Address> = out.iter().map(|(a, _)| a.clone()).collect();
        assert_eq!(found, [addr(2), addr(3)].into_iter().collect());
        assert_eq!(tags(&out), [HeuristicTag::TimingCorrelation].into_iter().collect());
    }

    #[test]
    fn test_timing_same_sender_and_self_excluded() {
        let me = addr(1);
        let txs = vec![
            TransactionRecord::call("a", &addr(2), "x.y", 1, 10),
            TransactionRecord::call("b", &addr(2), "x.y", 1, 20),
            TransactionRecord::call("c", &me, "x.y", 1, 30),
        ];

        let out = timing_correlation(&me, &txs, 300, usize::MAX);
        // only the (addr2, me) pairs qualify and me is never a candidate
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|(a, _)| *a == addr(2)));
    }

    #[test]
    fn test_timing_pair_cap() {
        let me = addr(1);
        let txs: Vec<TransactionRecord> = (0..50)
            .map(|i| TransactionRecord::call("t", &addr(i + 2), "x.y", 1, i as i64))
            .collect();

        let capped = timing_correlation(&me, &txs, 300, 10);
        assert_eq!(capped.len(), 20);
        let full = timing_correlation(&me, &txs, 300, usize::MAX);
        assert_eq!(full.len(), 50 * 49);
    }

    #[test]
    fn test_timing_extreme_timestamps_do_not_wrap() {
        let me = addr(1);
        let txs = vec![
            TransactionRecord::call("a", &addr(2), "x.y", 1, i64::MIN),
            TransactionRecord::call("b", &addr(3), "x.y", 2, i64::MAX),
        ];

        assert!(timing_correlation(&me, &txs, 300, usize::MAX).is_empty());
        assert!(apply_all(&me, &txs, &HeuristicParams::default()).is_empty());
    }

    #[test]
    fn test_fee_pattern_requires_distinct_senders() {
        let me = addr(1);
        let txs = vec![
            TransactionRecord::call("a", &addr(2), "x.y", 777, 0),
            TransactionRecord::call("b", &addr(2), "x.y", 777, 10_000),
            TransactionRecord::call("c", &addr(3), "x.y", 0, 20_000),
            TransactionRecord::call("d", &addr(4), "x.y", 0, 30_000),
        ];
        assert!(fee_pattern_similarity(&me, &txs).is_empty());

        let mut shared = txs.clone();
        shared.push(TransactionRecord::call("e", &me, "x.y", 777, 40_000));
        let out = fee_pattern_similarity(&me, &shared);
        assert_eq!(out, vec![(addr(2), HeuristicTag::FeePatternSimilarity)]);
    }

    #[test]
    fn test_missing_fields_yield_nothing() {
        let me = addr(1);
        let txs = vec![TransactionRecord::default(); 5];
        assert!(apply_all(&me, &txs, &HeuristicParams::default()).is_empty());
        assert!(apply_all(&me, &[], &HeuristicParams::default()).is_empty());
    }
}
