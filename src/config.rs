//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

use crate::address::{Address, ContractId};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub funding: FundingConfig,
    #[serde(default)]
    pub overlap: OverlapConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Known service (exchange) wallets: address -> label
    #[serde(default = "default_service_tags")]
    pub service_tags: HashMap<String, String>,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            clustering: ClusteringConfig::default(),
            funding: FundingConfig::default(),
            overlap: OverlapConfig::default(),
            scoring: ScoringConfig::default(),
            service_tags: default_service_tags(),
            server: ServerConfig::default(),
        }
    }
}

/// Chain indexer access
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Indexer base URLs, tried in order on failover
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,
    /// Optional `X-API-Key`; falls back to `HIRO_API_KEY`
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Attempts per endpoint before failing over
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Minimum spacing between two requests
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,
    /// Per-minute budget; derived from the presence of an API key when unset
    #[serde(default)]
    pub requests_per_minute: Option<u32>,
}

impl ApiConfig {
    pub fn effective_requests_per_minute(&self) -> u32 {
        self.requests_per_minute.unwrap_or(if self.api_key.is_some() {
            5000
        } else {
            500
        })
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            api_key: None,
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            min_request_interval_ms: default_min_request_interval_ms(),
            requests_per_minute: None,
        }
    }
}

/// Cluster expansion traversal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    #[serde(default = "default_max_hops")]
    pub max_hops: u32,
    /// Hard cap on analyzed addresses
    #[serde(default = "default_max_visited")]
    pub max_visited: usize,
    /// History page size per analyzed address
    #[serde(default = "default_cluster_tx_limit")]
    pub tx_limit: u32,
    #[serde(default = "default_timing_window_secs")]
    pub timing_window_secs: i64,
    /// Transfers that are exact multiples of this (micro-STX) count as round
    #[serde(default = "default_round_unit")]
    pub round_unit: u64,
    /// Upper bound on transaction pairs examined by the timing heuristic
    #[serde(default = "default_max_timing_pairs")]
    pub max_timing_pairs: usize,
    /// Record fee/timing evidence from the expansion
    #[serde(default = "default_true")]
    pub emit_evidence: bool,
    /// History depth read for the deployer profile
    #[serde(default = "default_profile_tx_limit")]
    pub profile_tx_limit: u32,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            max_hops: default_max_hops(),
            max_visited: default_max_visited(),
            tx_limit: default_cluster_tx_limit(),
            timing_window_secs: default_timing_window_secs(),
            round_unit: default_round_unit(),
            max_timing_pairs: default_max_timing_pairs(),
            emit_evidence: true,
            profile_tx_limit: default_profile_tx_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingConfig {
    #[serde(default = "default_funding_tx_limit")]
    pub tx_limit: u32,
    #[serde(default = "default_funding_confidence")]
    pub confidence: f64,
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self {
            tx_limit: default_funding_tx_limit(),
            confidence: default_funding_confidence(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlapConfig {
    /// Reference protocol contracts scanned for cluster callers
    #[serde(default = "default_reference_contracts")]
    pub contracts: Vec<String>,
    #[serde(default = "default_event_limit")]
    pub event_limit: u32,
    /// History sample per address for counterparty sets
    #[serde(default = "default_sample_size")]
    pub sample_size: u32,
    #[serde(default = "default_jaccard_threshold")]
    pub jaccard_threshold: f64,
    #[serde(default = "default_overlap_confidence")]
    pub confidence: f64,
    /// Look up the transaction for events without an embedded caller
    #[serde(default = "default_true")]
    pub resolve_event_callers: bool,
}

impl Default for OverlapConfig {
    fn default() -> Self {
        Self {
            contracts: default_reference_contracts(),
            event_limit: default_event_limit(),
            sample_size: default_sample_size(),
            jaccard_threshold: default_jaccard_threshold(),
            confidence: default_overlap_confidence(),
            resolve_event_callers: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Weight overrides by evidence type name
    #[serde(default)]
    pub weights: HashMap<String, f64>,
    /// Weight for evidence types without a default or override
    #[serde(default = "default_unknown_weight")]
    pub default_weight: f64,
    #[serde(default = "default_probable_threshold")]
    pub probable_threshold: f64,
    #[serde(default = "default_possible_threshold")]
    pub possible_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: HashMap::new(),
            default_weight: default_unknown_weight(),
            probable_threshold: default_probable_threshold(),
            possible_threshold: default_possible_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Finished jobs kept for result lookup; the oldest are evicted first
    #[serde(default = "default_retain_finished")]
    pub retain_finished: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            retain_finished: default_retain_finished(),
        }
    }
}

fn default_endpoints() -> Vec<String> {
    vec!["https://api.hiro.so".to_string()]
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    250
}

fn default_min_request_interval_ms() -> u64 {
    100
}

fn default_max_hops() -> u32 {
    2
}

fn default_max_visited() -> usize {
    100
}

fn default_cluster_tx_limit() -> u32 {
    50
}

fn default_timing_window_secs() -> i64 {
    300
}

fn default_round_unit() -> u64 {
    1_000_000
}

fn default_max_timing_pairs() -> usize {
    10_000
}

fn default_profile_tx_limit() -> u32 {
    200
}

fn default_funding_tx_limit() -> u32 {
    100
}

fn default_funding_confidence() -> f64 {
    0.8
}

fn default_reference_contracts() -> Vec<String> {
    [
        "arkadiko-dao",
        "arkadiko-stacker-v1-1",
        "arkadiko-vault-manager-v1-1",
    ]
    .iter()
    .map(|name| format!("SP2C2YFP12AJZB4MABJBAJ55XECVS7E4PMMZ89YZR.{}", name))
    .collect()
}

fn default_event_limit() -> u32 {
    100
}

fn default_sample_size() -> u32 {
    20
}

fn default_jaccard_threshold() -> f64 {
    0.3
}

fn default_overlap_confidence() -> f64 {
    0.6
}

fn default_unknown_weight() -> f64 {
    5.0
}

fn default_probable_threshold() -> f64 {
    70.0
}

fn default_possible_threshold() -> f64 {
    40.0
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_retain_finished() -> usize {
    256
}

fn default_true() -> bool {
    true
}

fn default_service_tags() -> HashMap<String, String> {
    [
        ("SP3FBR2AGK5H9QBDH3EEN6DF8EK8JY7RX8QJ5SVTE", "binance_hot_1"),
        ("SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7", "binance_hot_2"),
        ("SP1Y5YSTAHZ88XYK1VPDH24GY0HPX5J4JECTMY4A1", "okx_hot_1"),
        ("SP32AEEF6WW5Y0NMJ1S8SBSZDAY8R5J32NBZFPKKZ", "kucoin_hot_1"),
    ]
    .into_iter()
    .map(|(addr, label)| (addr.to_string(), label.to_string()))
    .collect()
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("api.timeout_ms", default_timeout_ms() as i64)?
            .set_default("api.max_retries", default_max_retries() as i64)?
            .set_default("clustering.max_hops", default_max_hops() as i64)?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (HUNTER__SECTION__KEY)
            .add_source(
                config::Environment::with_prefix("HUNTER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let mut config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Addresses are canonical upper-case; key handling differs between sources
        config.service_tags = config
            .service_tags
            .into_iter()
            .map(|(addr, label)| (addr.to_ascii_uppercase(), label))
            .collect();

        if config.api.api_key.is_none() {
            config.api.api_key = std::env::var("HIRO_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty());
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.api.endpoints.is_empty() {
            anyhow::bail!("api.endpoints must list at least one indexer URL");
        }

        for endpoint in &self.api.endpoints {
            let parsed = url::Url::parse(endpoint)
                .with_context(|| format!("Invalid indexer endpoint: {}", endpoint))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                anyhow::bail!("Indexer endpoint must be http(s): {}", endpoint);
            }
        }

        if self.api.timeout_ms == 0 {
            anyhow::bail!("api.timeout_ms must be positive");
        }

        if self.api.max_retries == 0 {
            anyhow::bail!("api.max_retries must be at least 1");
        }

        if self.clustering.max_visited == 0 {
            anyhow::bail!("clustering.max_visited must be at least 1");
        }

        if self.clustering.tx_limit == 0
            || self.clustering.profile_tx_limit == 0
            || self.funding.tx_limit == 0
        {
            anyhow::bail!("transaction limits must be positive");
        }

        if self.clustering.timing_window_secs <= 0 {
            anyhow::bail!("clustering.timing_window_secs must be positive");
        }

        if self.clustering.round_unit == 0 {
            anyhow::bail!("clustering.round_unit must be positive");
        }

        for (name, value) in [
            ("funding.confidence", self.funding.confidence),
            ("overlap.confidence", self.overlap.confidence),
            ("overlap.jaccard_threshold", self.overlap.jaccard_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{} must be between 0 and 1, got {}", name, value);
            }
        }

        let scoring = &self.scoring;
        if !(0.0..=100.0).contains(&scoring.possible_threshold)
            || !(0.0..=100.0).contains(&scoring.probable_threshold)
            || scoring.possible_threshold > scoring.probable_threshold
        {
            anyhow::bail!(
                "scoring thresholds must satisfy 0 <= possible ({}) <= probable ({}) <= 100",
                scoring.possible_threshold,
                scoring.probable_threshold
            );
        }

        if let Some((name, w)) = scoring.weights.iter().find(|(_, w)| **w < 0.0) {
            anyhow::bail!("scoring weight for {} cannot be negative ({})", name, w);
        }

        for contract in &self.overlap.contracts {
            ContractId::parse(contract)
                .with_context(|| format!("Invalid reference contract: {}", contract))?;
        }

        for address in self.service_tags.keys() {
            Address::parse(address)
                .with_context(|| format!("Invalid service tag address: {}", address))?;
        }

        self.server
            .bind
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid server.bind: {}", self.server.bind))?;

        if self.server.retain_finished == 0 {
            anyhow::bail!("server.retain_finished must be at least 1");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        let endpoints: Vec<String> = self.api.endpoints.iter().map(|e| mask_url(e)).collect();

        format!(
            r#"Configuration:
  API:
    endpoints: {:?}
    api_key: {}
    timeout: {}ms
    max_retries: {}
    rate: {}/min, {}ms spacing
  Clustering:
    max_hops: {}
    max_visited: {}
    tx_limit: {}
    timing_window: {}s
    emit_evidence: {}
    profile_tx_limit: {}
  Funding:
    tx_limit: {}
    confidence: {}
  Overlap:
    contracts: {}
    event_limit: {}
    sample_size: {}
    jaccard_threshold: {}
  Scoring:
    probable >= {}
    possible >= {}
    weight overrides: {}
  Service tags: {}
  Server:
    bind: {}
    retain_finished: {}
"#,
            endpoints,
            if self.api.api_key.is_some() {
                "***"
            } else {
                "(not set)"
            },
            self.api.timeout_ms,
            self.api.max_retries,
            self.api.effective_requests_per_minute(),
            self.api.min_request_interval_ms,
            self.clustering.max_hops,
            self.clustering.max_visited,
            self.clustering.tx_limit,
            self.clustering.timing_window_secs,
            self.clustering.emit_evidence,
            self.clustering.profile_tx_limit,
            self.funding.tx_limit,
            self.funding.confidence,
            self.overlap.contracts.len(),
            self.overlap.event_limit,
            self.overlap.sample_size,
            self.overlap.jaccard_threshold,
            self.scoring.probable_threshold,
            self.scoring.possible_threshold,
            self.scoring.weights.len(),
            self.service_tags.len(),
            self.server.bind,
            self.server.retain_finished,
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}
