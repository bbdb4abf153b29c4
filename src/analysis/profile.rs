//! Behavioral profile of a single address
//!
//! Computes activity and pattern metrics over an address history:
//! - activity level from transaction count
//! - fee consistency and round-number transfer frequency
//! - nonce sequencing
//! - burst detection and interval regularity
//! - active periods separated by day-long gaps
//! - service classification and a risk assessment derived from the above

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

use crate::address::Address;
use crate::chain::{ChainDataProvider, TransactionRecord};

/// Provider page size for history fetches
const PAGE_SIZE: u32 = 50;

/// Gap (seconds) that still joins two transactions into one burst
const BURST_GAP_SECS: i64 = 3600;
/// Smallest group of transactions that counts as a burst
const MIN_BURST_SIZE: usize = 5;
/// Histories shorter than this are not checked for bursts
const MIN_BURST_HISTORY: usize = 10;

/// Coefficient of variation below which intervals count as regular
const REGULARITY_CV: f64 = 0.2;
const MIN_REGULARITY_GAPS: usize = 5;

/// Silence (seconds) that splits activity into separate periods
const ACTIVE_PERIOD_GAP_SECS: i64 = 86_400;
const SECS_PER_DAY: f64 = 86_400.0;

// Service classification
const EXCHANGE_MIN_TXS: usize = 1_000;
const INDIVIDUAL_MAX_TXS: usize = 50;
const AUTOMATED_ROUND_FREQUENCY: f64 = 0.7;

// Risk thresholds
const VERY_HIGH_VOLUME_TXS: usize = 10_000;
const SUSPICIOUS_BURST_COUNT: usize = 10;
const EXCESSIVE_ROUND_FREQUENCY: f64 = 0.8;
/// Sample variance of fees (micro-STX squared)
const INCONSISTENT_FEE_VARIANCE: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Inactive,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ActivityLevel {
    pub fn from_count(count: usize) -> Self {
        match count {
            0 => ActivityLevel::Inactive,
            1..=9 => ActivityLevel::Low,
            10..=99 => ActivityLevel::Medium,
            100..=999 => ActivityLevel::High,
            _ => ActivityLevel::VeryHigh,
        }
    }
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActivityLevel::Inactive => "inactive",
            ActivityLevel::Low => "low",
            ActivityLevel::Medium => "medium",
            ActivityLevel::High => "high",
            ActivityLevel::VeryHigh => "very_high",
        };
        f.write_str(label)
    }
}

/// Clusters of closely spaced transactions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurstActivity {
    pub detected: bool,
    pub burst_count: usize,
    pub largest_burst: usize,
}

/// Activity split into periods separated by day-long silences
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemporalPatterns {
    pub total_period_days: f64,
    pub active_periods: usize,
    pub longest_inactive_days: f64,
    /// Active periods per observed day; 0 when all activity shares one timestamp
    pub activity_consistency: f64,
}

impl TemporalPatterns {
    /// `timestamps` must be sorted ascending. `None` with fewer than two.
    pub fn from_sorted(timestamps: &[i64]) -> Option<Self> {
        let (first, last) = match timestamps {
            [first, .., last] => (*first, *last),
            _ => return None,
        };

        let mut active_periods = 1;
        let mut longest_gap = 0i64;
        for w in timestamps.windows(2) {
            let gap = w[1].saturating_sub(w[0]);
            if gap > ACTIVE_PERIOD_GAP_SECS {
                active_periods += 1;
                longest_gap = longest_gap.max(gap);
            }
        }

        let total_period_days = last.saturating_sub(first) as f64 / SECS_PER_DAY;
        let activity_consistency = if total_period_days > 0.0 {
            active_periods as f64 / total_period_days
        } else {
            0.0
        };

        Some(Self {
            total_period_days,
            active_periods,
            longest_inactive_days: longest_gap as f64 / SECS_PER_DAY,
            activity_consistency,
        })
    }
}

/// What kind of operator an address looks like
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "label", rename_all = "snake_case")]
pub enum ServiceType {
    /// Tagged service wallet
    Known(String),
    ExchangeSuspected,
    AutomatedService,
    IndividualSuspected,
    Unknown,
}

impl ServiceType {
    fn classify(
        transaction_count: usize,
        bursts: &BurstActivity,
        regular_intervals: bool,
        round_number_frequency: Option<f64>,
    ) -> Self {
        if transaction_count > EXCHANGE_MIN_TXS && regular_intervals {
            ServiceType::ExchangeSuspected
        } else if bursts.detected
            && round_number_frequency.is_some_and(|f| f > AUTOMATED_ROUND_FREQUENCY)
        {
            ServiceType::AutomatedService
        } else if transaction_count < INDIVIDUAL_MAX_TXS {
            ServiceType::IndividualSuspected
        } else {
            ServiceType::Unknown
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceType::Known(label) => write!(f, "known service ({})", label),
            ServiceType::ExchangeSuspected => f.write_str("exchange_suspected"),
            ServiceType::AutomatedService => f.write_str("automated_service"),
            ServiceType::IndividualSuspected => f.write_str("individual_suspected"),
            ServiceType::Unknown => f.write_str("unknown"),
        }
    }
}

/// Pattern that raises an address or deployment risk score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    VeryHighVolume,
    SuspiciousBurstActivity,
    ExcessiveRoundAmounts,
    InconsistentFees,
    UnusualDeploymentTime,
    DeployedInBusyBlock,
    HighRiskDeployer,
    VeryActiveDeployer,
}

impl RiskFactor {
    pub fn weight(&self) -> f64 {
        match self {
            RiskFactor::VeryHighVolume => 0.3,
            RiskFactor::SuspiciousBurstActivity => 0.4,
            RiskFactor::ExcessiveRoundAmounts => 0.3,
            RiskFactor::InconsistentFees => 0.2,
            RiskFactor::UnusualDeploymentTime => 0.2,
            RiskFactor::DeployedInBusyBlock => 0.1,
            RiskFactor::HighRiskDeployer => 0.4,
            RiskFactor::VeryActiveDeployer => 0.2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskFactor::VeryHighVolume => "very_high_volume",
            RiskFactor::SuspiciousBurstActivity => "suspicious_burst_activity",
            RiskFactor::ExcessiveRoundAmounts => "excessive_round_amounts",
            RiskFactor::InconsistentFees => "inconsistent_fees",
            RiskFactor::UnusualDeploymentTime => "unusual_deployment_time",
            RiskFactor::DeployedInBusyBlock => "deployed_in_busy_block",
            RiskFactor::HighRiskDeployer => "high_risk_deployer",
            RiskFactor::VeryActiveDeployer => "very_active_deployer",
        }
    }
}

impl fmt::Display for RiskFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score > 0.7 {
            RiskLevel::High
        } else if score > 0.3 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        };
        f.write_str(label)
    }
}

/// Risk factors with their combined score, capped at 1.0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_score: f64,
    pub risk_factors: Vec<RiskFactor>,
    pub risk_level: RiskLevel,
}

impl RiskAssessment {
    pub fn from_factors(risk_factors: Vec<RiskFactor>) -> Self {
        let risk_score = risk_factors
            .iter()
            .map(|f| f.weight())
            .sum::<f64>()
            .min(1.0);
        Self {
            risk_score,
            risk_level: RiskLevel::from_score(risk_score),
            risk_factors,
        }
    }
}

impl Default for RiskAssessment {
    fn default() -> Self {
        Self::from_factors(Vec::new())
    }
}

/// Behavioral metrics for one address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressProfile {
    pub address: Address,
    pub transaction_count: usize,
    pub activity_level: ActivityLevel,
    pub average_fee: Option<f64>,
    /// Distinct fees / fee observations; low values mean a fixed fee habit
    pub fee_consistency: Option<f64>,
    /// Sample variance of fees; needs two observations
    pub fee_variance: Option<f64>,
    /// Share of transfer amounts that are whole STX
    pub round_number_frequency: Option<f64>,
    /// Share of consecutive nonces that differ by exactly one
    pub nonce_sequential_ratio: Option<f64>,
    pub bursts: BurstActivity,
    pub regular_intervals: bool,
    pub temporal: Option<TemporalPatterns>,
    pub service_type: ServiceType,
    pub risk: RiskAssessment,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    /// Hex SHA-256 of the deployed contract source
    pub source_hash: Option<String>,
    pub deploy_tx: Option<String>,
}

impl AddressProfile {
    /// Profile an already fetched history
    pub fn from_history(address: &Address, txs: &[TransactionRecord]) -> Self {
        let fees: Vec<u64> = txs.iter().filter_map(|tx| tx.fee()).collect();
        let average_fee = (!fees.is_empty())
            .then(|| fees.iter().map(|f| *f as f64).sum::<f64>() / fees.len() as f64);
        let fee_consistency = (!fees.is_empty()).then(|| {
            let distinct: HashSet<u64> = fees.iter().copied().collect();
            distinct.len() as f64 / fees.len() as f64
        });

        let amounts: Vec<u64> = txs
            .iter()
            .filter(|tx| tx.is_token_transfer())
            .filter_map(|tx| tx.amount())
            .collect();
        let round_number_frequency = (!amounts.is_empty()).then(|| {
            let round = amounts.iter().filter(|a| *a % 1_000_000 == 0).count();
            round as f64 / amounts.len() as f64
        });

        let mut timestamps: Vec<i64> = txs.iter().filter_map(|tx| tx.timestamp()).collect();
        timestamps.sort_unstable();

        let fee_variance = sample_variance(&fees);
        let bursts = detect_bursts(&timestamps);
        let regular_intervals = has_regular_intervals(&timestamps);
        let service_type =
            ServiceType::classify(txs.len(), &bursts, regular_intervals, round_number_frequency);

        let mut factors = Vec::new();
        if txs.len() > VERY_HIGH_VOLUME_TXS {
            factors.push(RiskFactor::VeryHighVolume);
        }
        if bursts.detected && bursts.burst_count > SUSPICIOUS_BURST_COUNT {
            factors.push(RiskFactor::SuspiciousBurstActivity);
        }
        if round_number_frequency.is_some_and(|f| f > EXCESSIVE_ROUND_FREQUENCY) {
            factors.push(RiskFactor::ExcessiveRoundAmounts);
        }
        if fee_variance.is_some_and(|v| v > INCONSISTENT_FEE_VARIANCE) {
            factors.push(RiskFactor::InconsistentFees);
        }

        Self {
            address: address.clone(),
            transaction_count: txs.len(),
            activity_level: ActivityLevel::from_count(txs.len()),
            average_fee,
            fee_consistency,
            fee_variance,
            round_number_frequency,
            nonce_sequential_ratio: nonce_sequential_ratio(txs),
            bursts,
            regular_intervals,
            temporal: TemporalPatterns::from_sorted(&timestamps),
            service_type,
            risk: RiskAssessment::from_factors(factors),
            first_seen: timestamps
                .first()
                .and_then(|ts| DateTime::from_timestamp(*ts, 0)),
            last_seen: timestamps
                .last()
                .and_then(|ts| DateTime::from_timestamp(*ts, 0)),
            source_hash: None,
            deploy_tx: None,
        }
    }

    /// Attach the deployed contract's source hash
    pub fn with_source(mut self, source_code: &str) -> Self {
        self.source_hash = Some(source_hash(source_code));
        self
    }

    pub fn with_deploy_tx(mut self, tx_id: impl Into<String>) -> Self {
        self.deploy_tx = Some(tx_id.into());
        self
    }

    /// Tagged service wallets take their label over the inferred type
    pub fn with_service_label(mut self, label: Option<&str>) -> Self {
        if let Some(label) = label {
            self.service_type = ServiceType::Known(label.to_string());
        }
        self
    }
}

/// Fetch up to `limit` transactions for `address` page by page and profile them
pub async fn profile_address(
    provider: &dyn ChainDataProvider,
    address: &Address,
    limit: u32,
) -> AddressProfile {
    let mut history: Vec<TransactionRecord> = Vec::new();
    let mut offset = 0;

    while offset < limit {
        let page_size = PAGE_SIZE.min(limit - offset);
        let page = provider.get_transactions(address, page_size, offset).await;
        let fetched = page.len() as u32;
        history.extend(page);

        if fetched < page_size {
            break;
        }
        offset += fetched;
    }

    let profile = AddressProfile::from_history(address, &history);
    debug!(
        address = %address.short(),
        txs = profile.transaction_count,
        activity = %profile.activity_level,
        "Profiled address"
    );
    profile
}

/// Hex SHA-256 digest
pub fn source_hash(source_code: &str) -> String {
    let digest = Sha256::digest(source_code.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn sample_variance(values: &[u64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|v| *v as f64).sum::<f64>() / n;
    Some(values.iter().map(|v| (*v as f64 - mean).powi(2)).sum::<f64>() / (n - 1.0))
}

fn nonce_sequential_ratio(txs: &[TransactionRecord]) -> Option<f64> {
    let mut nonces: Vec<u64> = txs.iter().filter_map(|tx| tx.nonce).collect();
    if nonces.len() < 2 {
        return None;
    }
    nonces.sort_unstable();

    let gaps = nonces.len() - 1;
    let sequential = nonces.windows(2).filter(|w| w[1] - w[0] == 1).count();
    Some(sequential as f64 / gaps as f64)
}

/// `timestamps` must be sorted ascending
fn detect_bursts(timestamps: &[i64]) -> BurstActivity {
    if timestamps.len() < MIN_BURST_HISTORY {
        return BurstActivity::default();
    }

    let mut groups: Vec<usize> = Vec::new();
    let mut current = 1;
    for w in timestamps.windows(2) {
        if w[1].saturating_sub(w[0]) <= BURST_GAP_SECS {
            current += 1;
        } else {
            groups.push(current);
            current = 1;
        }
    }
    groups.push(current);

    let bursts: Vec<usize> = groups.into_iter().filter(|g| *g >= MIN_BURST_SIZE).collect();
    BurstActivity {
        detected: !bursts.is_empty(),
        burst_count: bursts.len(),
        largest_burst: bursts.iter().copied().max().unwrap_or(0),
    }
}

/// `timestamps` must be sorted ascending
fn has_regular_intervals(timestamps: &[i64]) -> bool {
    let gaps: Vec<f64> = timestamps
        .windows(2)
        .map(|w| w[1].saturating_sub(w[0]) as f64)
        .collect();
    if gaps.len() < MIN_REGULARITY_GAPS {
        return false;
    }

    let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
    if mean <= 0.0 {
        return false;
    }
    let variance =
        gaps.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / (gaps.len() - 1) as f64;

    variance.sqrt() / mean < REGULARITY_CV
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MemoryProvider;

    fn addr(n: u32) -> Address {
        Address::parse(&format!("SP{:0>39}", n)).unwrap()
    }

    #[test]
    fn test_activity_levels() {
        assert_eq!(ActivityLevel::from_count(0), ActivityLevel::Inactive);
        assert_eq!(ActivityLevel::from_count(9), ActivityLevel::Low);
        assert_eq!(ActivityLevel::from_count(10), ActivityLevel::Medium);
        assert_eq!(ActivityLevel::from_count(999), ActivityLevel::High);
        assert_eq!(ActivityLevel::from_count(1_000), ActivityLevel::VeryHigh);
    }

    #[test]
    fn test_fee_and_amount_metrics() {
        let (a, b) = (addr(1), addr(2));
        let txs = vec![
            TransactionRecord::transfer("0x1", &a, &b, 3_000_000, 500, 100).with_nonce(1),
            TransactionRecord::transfer("0x2", &a, &b, 1_234_567, 500, 200).with_nonce(2),
            TransactionRecord::call("0x3", &a, "SP000.pool", 800, 300).with_nonce(4),
            TransactionRecord::transfer("0x4", &a, &b, 5_000_000, 500, 400).with_nonce(5),
        ];
        let profile = AddressProfile::from_history(&a, &txs);

        assert_eq!(profile.transaction_count, 4);
        assert_eq!(profile.activity_level, ActivityLevel::Low);
        assert_eq!(profile.fee_consistency, Some(0.5));
        assert_eq!(profile.average_fee, Some(575.0));
        assert!((profile.round_number_frequency.unwrap() - 2.0 / 3.0).abs() < 1e-9);
        // gaps 1, 2, 1
        assert!((profile.nonce_sequential_ratio.unwrap() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(profile.first_seen.unwrap().timestamp(), 100);
        assert_eq!(profile.last_seen.unwrap().timestamp(), 400);
    }

    #[test]
    fn test_empty_history() {
        let profile = AddressProfile::from_history(&addr(1), &[]);
        assert_eq!(profile.activity_level, ActivityLevel::Inactive);
        assert!(profile.fee_consistency.is_none());
        assert!(profile.round_number_frequency.is_none());
        assert!(profile.nonce_sequential_ratio.is_none());
        assert!(!profile.bursts.detected);
        assert!(!profile.regular_intervals);
        assert!(profile.first_seen.is_none());
    }

    #[test]
    fn test_burst_detection() {
        // six within minutes, a day of silence, then five more
        let mut ts: Vec<i64> = (0..6).map(|i| i * 60).collect();
        ts.extend((0..5).map(|i| 86_400 + i * 600));
        let bursts = detect_bursts(&ts);
        assert!(bursts.detected);
        assert_eq!(bursts.burst_count, 2);
        assert_eq!(bursts.largest_burst, 6);

        // too short to judge
        assert_eq!(detect_bursts(&ts[..6]), BurstActivity::default());

        // spread out
        let sparse: Vec<i64> = (0..12).map(|i| i * 7_200).collect();
        assert!(!detect_bursts(&sparse).detected);
    }

    #[test]
    fn test_regular_intervals() {
        let regular: Vec<i64> = (0..8).map(|i| i * 3_600).collect();
        assert!(has_regular_intervals(&regular));

        let irregular = vec![0, 10, 5_000, 5_020, 40_000, 40_001, 90_000];
        assert!(!has_regular_intervals(&irregular));

        // four gaps is not enough
        assert!(!has_regular_intervals(&regular[..5]));
    }

    #[test]
    fn test_extreme_timestamps_saturate() {
        let mut ts = vec![i64::MIN; 6];
        ts.extend([0, 60, 120]);
        ts.push(i64::MAX);
        ts.push(i64::MAX);

        let bursts = detect_bursts(&ts);
        assert_eq!(bursts.burst_count, 1);
        assert_eq!(bursts.largest_burst, 6);
        assert!(!has_regular_intervals(&ts));

        let temporal = TemporalPatterns::from_sorted(&ts).unwrap();
        assert_eq!(temporal.active_periods, 3);
        assert!(temporal.total_period_days > 0.0);
    }

    #[test]
    fn test_temporal_patterns() {
        // gaps: 1h, ~2.3d, 100s, ~3.5d
        let ts = vec![0, 3_600, 200_000, 200_100, 500_000];
        let temporal = TemporalPatterns::from_sorted(&ts).unwrap();

        assert_eq!(temporal.active_periods, 3);
        assert!((temporal.longest_inactive_days - 299_900.0 / 86_400.0).abs() < 1e-9);
        assert!((temporal.total_period_days - 500_000.0 / 86_400.0).abs() < 1e-9);
        assert!((temporal.activity_consistency - 3.0 / (500_000.0 / 86_400.0)).abs() < 1e-9);

        let same_second = TemporalPatterns::from_sorted(&[42, 42]).unwrap();
        assert_eq!(same_second.active_periods, 1);
        assert_eq!(same_second.activity_consistency, 0.0);

        assert!(TemporalPatterns::from_sorted(&[1]).is_none());
        assert!(AddressProfile::from_history(&addr(1), &[]).temporal.is_none());
    }

    fn transfers(
        count: i64,
        amount: u64,
        fee: u64,
        time: impl Fn(i64) -> i64,
    ) -> Vec<TransactionRecord> {
        let (a, b) = (addr(1), addr(2));
        (0..count)
            .map(|i| {
                TransactionRecord::transfer(&format!("0x{}", i), &a, &b, amount, fee, time(i))
            })
            .collect()
    }

    #[test]
    fn test_service_classification() {
        let a = addr(1);

        let few =
            AddressProfile::from_history(&a, &transfers(3, 1_234_567, 10, |i| i * 90_000));
        assert_eq!(few.service_type, ServiceType::IndividualSuspected);

        // tight burst of whole-STX payouts
        let payouts =
            AddressProfile::from_history(&a, &transfers(12, 1_000_000, 10, |i| i * 60));
        assert!(payouts.bursts.detected);
        assert_eq!(payouts.service_type, ServiceType::AutomatedService);

        // high volume on a fixed schedule
        let schedule =
            AddressProfile::from_history(&a, &transfers(1_001, 1_234_567, 10, |i| i * 3_600));
        assert!(schedule.regular_intervals);
        assert_eq!(schedule.service_type, ServiceType::ExchangeSuspected);

        // regular but neither busy nor bursty
        let steady =
            AddressProfile::from_history(&a, &transfers(60, 1_234_567, 10, |i| i * 7_200));
        assert_eq!(steady.service_type, ServiceType::Unknown);

        let tagged = steady.with_service_label(Some("binance_hot_1"));
        assert_eq!(tagged.service_type, ServiceType::Known("binance_hot_1".into()));
        assert_eq!(tagged.service_type.to_string(), "known service (binance_hot_1)");
        assert_eq!(
            tagged.clone().with_service_label(None).service_type,
            tagged.service_type
        );
    }

    #[test]
    fn test_risk_assessment() {
        let a = addr(1);

        let quiet =
            AddressProfile::from_history(&a, &transfers(3, 1_234_567, 10, |i| i * 90_000));
        assert!(quiet.risk.risk_factors.is_empty());
        assert_eq!(quiet.risk.risk_level, RiskLevel::Low);
        assert_eq!(quiet.fee_variance, Some(0.0));

        // eleven separate bursts of five whole-STX transfers
        let grouped = transfers(55, 1_000_000, 10, |i| (i / 5) * 10_000 + (i % 5) * 60);
        let bursty = AddressProfile::from_history(&a, &grouped);
        assert_eq!(bursty.bursts.burst_count, 11);
        assert_eq!(
            bursty.risk.risk_factors,
            vec![RiskFactor::SuspiciousBurstActivity, RiskFactor::ExcessiveRoundAmounts]
        );
        assert!((bursty.risk.risk_score - 0.7).abs() < 1e-9);
        assert_eq!(bursty.risk.risk_level, RiskLevel::Medium);

        let (b, c) = (addr(2), addr(3));
        let erratic = vec![
            TransactionRecord::transfer("0x1", &a, &b, 5, 100, 0),
            TransactionRecord::transfer("0x2", &a, &c, 7, 5_000, 10),
        ];
        let erratic = AddressProfile::from_history(&a, &erratic);
        assert!(erratic.fee_variance.unwrap() > 1_000_000.0);
        assert_eq!(erratic.risk.risk_factors, vec![RiskFactor::InconsistentFees]);
    }

    #[test]
    fn test_risk_score_caps_at_one() {
        let all = RiskAssessment::from_factors(vec![
            RiskFactor::VeryHighVolume,
            RiskFactor::SuspiciousBurstActivity,
            RiskFactor::ExcessiveRoundAmounts,
            RiskFactor::InconsistentFees,
        ]);
        assert_eq!(all.risk_score, 1.0);
        assert_eq!(all.risk_level, RiskLevel::High);
        assert_eq!(RiskAssessment::default().risk_level, RiskLevel::Low);
        assert_eq!(
            serde_json::to_string(&RiskFactor::DeployedInBusyBlock).unwrap(),
            "\"deployed_in_busy_block\""
        );
    }

    #[test]
    fn test_source_hash() {
        assert_eq!(
            source_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        let profile = AddressProfile::from_history(&addr(1), &[]).with_source("(define-data-var x uint u0)");
        assert_eq!(profile.source_hash.as_ref().map(|h| h.len()), Some(64));
    }

    #[tokio::test]
    async fn test_profile_address_paginates() {
        let a = addr(1);
        let b = addr(2);
        let txs: Vec<TransactionRecord> = (0..120)
            .map(|i| TransactionRecord::transfer(&format!("0x{}", i), &a, &b, 1, 10, i))
            .collect();
        let provider = MemoryProvider::new().with_history(a.clone(), txs);

        let profile = profile_address(&provider, &a, 200).await;
        assert_eq!(profile.transaction_count, 120);
        assert_eq!(profile.activity_level, ActivityLevel::High);
        // pages of 50, 50, 20
        assert_eq!(provider.calls(), 3);

        let capped = profile_address(&provider, &a, 60).await;
        assert_eq!(capped.transaction_count, 60);
    }
}
