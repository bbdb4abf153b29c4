//! Hiro extended API client
//!
//! Provides access to:
//! - Address transaction histories
//! - Contract metadata and deploy transactions
//! - Contract event logs
//! - Block transaction listings
//! - Indexer status (health checks)
//!
//! Requests are spaced by a rate limiter, retried with exponential backoff on
//! transient failures, and rotated to the next configured endpoint once the
//! retries on one endpoint are exhausted.

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::types::{ContractRecord, EventRecord, IndexerStatus, Page, TransactionRecord};
use super::ChainDataProvider;
use crate::address::{Address, ContractId};
use crate::config::ApiConfig;
use crate::error::{Error, Result};

/// Request pacing: minimum spacing plus a per-minute budget
struct RateLimiter {
    min_interval: Duration,
    per_minute: u32,
    state: Mutex<LimiterState>,
}

struct LimiterState {
    last_request: Option<Instant>,
    window_start: Instant,
    window_count: u32,
}

impl RateLimiter {
    fn new(min_interval: Duration, per_minute: u32) -> Self {
        Self {
            min_interval,
            per_minute: per_minute.max(1),
            state: Mutex::new(LimiterState {
                last_request: None,
                window_start: Instant::now(),
                window_count: 0,
            }),
        }
    }

    /// Wait until the next request may be sent. Holding the lock while
    /// sleeping serializes callers.
    async fn acquire(&self) {
        let mut state = self.state.lock().await;

        let window = Duration::from_secs(60);
        if state.window_start.elapsed() >= window {
            state.window_start = Instant::now();
            state.window_count = 0;
        }

        if state.window_count >= self.per_minute {
            let wait = window.saturating_sub(state.window_start.elapsed());
            debug!(wait_ms = wait.as_millis() as u64, "Per-minute budget spent");
            tokio::time::sleep(wait).await;
            state.window_start = Instant::now();
            state.window_count = 0;
        }

        if let Some(last) = state.last_request {
            let since = last.elapsed();
            if since < self.min_interval {
                tokio::time::sleep(self.min_interval - since).await;
            }
        }

        state.last_request = Some(Instant::now());
        state.window_count += 1;
    }
}

/// Hiro API client
pub struct HiroClient {
    /// HTTP client
    client: Client,
    /// Base URLs in failover order
    endpoints: Vec<String>,
    /// Index of the endpoint currently in use
    current: AtomicUsize,
    api_key: Option<String>,
    timeout_ms: u64,
    max_retries: u32,
    retry_base_delay: Duration,
    limiter: RateLimiter,
}

impl HiroClient {
    /// Create a new Hiro client
    pub fn new(config: &ApiConfig) -> Result<Self> {
        if config.endpoints.is_empty() {
            return Err(Error::Config("no indexer endpoints configured".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoints: config
                .endpoints
                .iter()
                .map(|e| e.trim_end_matches('/').to_string())
                .collect(),
            current: AtomicUsize::new(0),
            api_key: config.api_key.clone(),
            timeout_ms: config.timeout_ms,
            max_retries: config.max_retries.max(1),
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
            limiter: RateLimiter::new(
                Duration::from_millis(config.min_request_interval_ms),
                config.effective_requests_per_minute(),
            ),
        })
    }

    /// Endpoint currently in use
    pub fn active_endpoint(&self) -> &str {
        &self.endpoints[self.current.load(Ordering::Relaxed) % self.endpoints.len()]
    }

    fn rotate_from(&self, index: usize) {
        let next = (index + 1) % self.endpoints.len();
        // only rotate if nobody else already moved on
        let _ = self
            .current
            .compare_exchange(index, next, Ordering::Relaxed, Ordering::Relaxed);
    }

    /// GET `path` as JSON. `Ok(None)` on 404.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        let mut last_error = Error::Api("no endpoint attempted".to_string());

        for _ in 0..self.endpoints.len() {
            let index = self.current.load(Ordering::Relaxed) % self.endpoints.len();
            let base = &self.endpoints[index];

            match self.get_with_retry(base, path, query).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    warn!(endpoint = %base, error = %e, "Endpoint exhausted, failing over");
                    self.rotate_from(index);
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error)
    }

    async fn get_with_retry<T: DeserializeOwned>(
        &self,
        base: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        let backoff = ExponentialBackoff {
            initial_interval: self.retry_base_delay,
            max_interval: self.retry_base_delay * 8,
            max_elapsed_time: Some(Duration::from_millis(self.timeout_ms * 2)),
            ..Default::default()
        };

        let attempts = AtomicU32::new(0);

        retry(backoff, || async {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            match self.send_once(base, path, query).await {
                Ok(value) => Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    debug!(path, attempt, error = %e, "Retryable indexer error");
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await
    }

    /// Single request attempt
    async fn send_once<T: DeserializeOwned>(
        &self,
        base: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        self.limiter.acquire().await;

        let url = format!("{}{}", base, path);
        debug!(url = %url, "Indexer request");

        let mut request = self.client.get(&url).query(query);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::ApiTimeout(self.timeout_ms)
            } else if e.is_connect() {
                Error::ApiConnection(e.to_string())
            } else {
                Error::Api(format!("request to {} failed: {}", url, e))
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let value = response
            .json::<T>()
            .await
            .map_err(|e| Error::Deserialization(format!("{}: {}", url, e)))?;

        Ok(Some(value))
    }

    /// Fetch a page of an address's transaction history
    pub async fn fetch_transactions(
        &self,
        address: &Address,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<TransactionRecord>> {
        let page: Option<Page<TransactionRecord>> = self
            .get_json(
                &transactions_path(address),
                &[("limit", limit.to_string()), ("offset", offset.to_string())],
            )
            .await?;

        Ok(page.map(|p| p.results).unwrap_or_default())
    }

    pub async fn fetch_contract(&self, contract_id: &ContractId) -> Result<Option<ContractRecord>> {
        self.get_json(&contract_path(contract_id), &[]).await
    }

    pub async fn fetch_transaction(&self, tx_id: &str) -> Result<Option<TransactionRecord>> {
        self.get_json(&format!("/extended/v1/tx/{}", tx_id), &[])
            .await
    }

    pub async fn fetch_contract_events(
        &self,
        contract_id: &ContractId,
        limit: u32,
    ) -> Result<Vec<EventRecord>> {
        let page: Option<Page<EventRecord>> = self
            .get_json(
                &format!("{}/events", contract_path(contract_id)),
                &[("limit", limit.to_string())],
            )
            .await?;

        Ok(page.map(|p| p.results).unwrap_or_default())
    }

    pub async fn fetch_block_transactions(
        &self,
        height: u64,
        limit: u32,
    ) -> Result<Vec<TransactionRecord>> {
        let page: Option<Page<TransactionRecord>> = self
            .get_json(&block_transactions_path(height), &[("limit", limit.to_string())])
            .await?;

        Ok(page.map(|p| p.results).unwrap_or_default())
    }

    /// Indexer status for health checks
    pub async fn status(&self) -> Result<IndexerStatus> {
        self.get_json("/extended/v1/status", &[])
            .await?
            .ok_or_else(|| Error::Api("status endpoint not found".to_string()))
    }
}

fn transactions_path(address: &Address) -> String {
    format!("/extended/v1/address/{}/transactions", address)
}

fn contract_path(contract_id: &ContractId) -> String {
    format!("/extended/v1/contract/{}", contract_id)
}

fn block_transactions_path(height: u64) -> String {
    format!("/extended/v1/tx/block_height/{}", height)
}

/// Map a non-success, non-404 status to an error
fn classify_status(status: StatusCode, body: String) -> Error {
    if status == StatusCode::TOO_MANY_REQUESTS {
        Error::RateLimited
    } else if status.is_server_error() {
        Error::Api(format!("indexer returned {}: {}", status, body))
    } else {
        Error::ApiRejected {
            status: status.as_u16(),
            body,
        }
    }
}

#[async_trait]
impl ChainDataProvider for HiroClient {
    fn name(&self) -> &'static str {
        "hiro"
    }

    async fn get_transactions(
        &self,
        address: &Address,
        limit: u32,
        offset: u32,
    ) -> Vec<TransactionRecord> {
        match self.fetch_transactions(address, limit, offset).await {
            Ok(txs) => txs,
            Err(e) => {
                warn!(address = %address.short(), error = %e, "History unavailable");
                Vec::new()
            }
        }
    }

    async fn get_contract_info(&self, contract_id: &ContractId) -> Option<ContractRecord> {
        self.fetch_contract(contract_id).await.unwrap_or_else(|e| {
            warn!(contract = %contract_id, error = %e, "Contract lookup failed");
            None
        })
    }

    async fn get_transaction(&self, tx_id: &str) -> Option<TransactionRecord> {
        self.fetch_transaction(tx_id).await.unwrap_or_else(|e| {
            warn!(tx_id, error = %e, "Transaction lookup failed");
            None
        })
    }

    async fn get_contract_events(
        &self,
        contract_id: &ContractId,
        limit: u32,
    ) -> Vec<EventRecord> {
        match self.fetch_contract_events(contract_id, limit).await {
            Ok(events) => events,
            Err(e) => {
                warn!(contract = %contract_id, error = %e, "Events unavailable");
                Vec::new()
            }
        }
    }

    async fn get_block_transactions(&self, height: u64, limit: u32) -> Vec<TransactionRecord> {
        match self.fetch_block_transactions(height, limit).await {
            Ok(txs) => txs,
            Err(e) => {
                warn!(height, error = %e, "Block transactions unavailable");
                Vec::new()
            }
        }
    }
}
