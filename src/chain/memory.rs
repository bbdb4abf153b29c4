//! In-memory provider for fixture replay and tests

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use super::types::{ContractRecord, EventRecord, TransactionRecord};
use super::ChainDataProvider;
use crate::address::{Address, ContractId};
use crate::error::{Error, Result};

/// On-disk fixture layout, keyed by address / contract id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub transactions: HashMap<String, Vec<TransactionRecord>>,
    #[serde(default)]
    pub contracts: HashMap<String, ContractRecord>,
    #[serde(default)]
    pub events: HashMap<String, Vec<EventRecord>>,
    /// Extra records reachable only by tx id (deploy transactions etc.)
    #[serde(default)]
    pub lookups: Vec<TransactionRecord>,
    /// Block listings keyed by height
    #[serde(default)]
    pub blocks: HashMap<u64, Vec<TransactionRecord>>,
}

/// Serves canned chain data
#[derive(Debug, Default)]
pub struct MemoryProvider {
    histories: HashMap<Address, Vec<TransactionRecord>>,
    by_id: HashMap<String, TransactionRecord>,
    contracts: HashMap<String, ContractRecord>,
    events: HashMap<String, Vec<EventRecord>>,
    blocks: HashMap<u64, Vec<TransactionRecord>>,
    calls: AtomicU64,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: Fixture) -> Self {
        let mut provider = Self::new();
        for (address, txs) in fixture.transactions {
            provider = provider.with_history(Address::from_chain(address), txs);
        }
        for (id, contract) in fixture.contracts {
            provider.contracts.insert(id, contract);
        }
        provider.events = fixture.events;
        for tx in fixture.lookups {
            provider = provider.with_transaction(tx);
        }
        for (height, txs) in fixture.blocks {
            provider = provider.with_block(height, txs);
        }
        provider
    }

    /// Load a JSON fixture file
    pub fn from_fixture_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let fixture: Fixture = serde_json::from_str(&raw).map_err(|e| {
            Error::Deserialization(format!("fixture {}: {}", path.display(), e))
        })?;

        info!(
            path = %path.display(),
            addresses = fixture.transactions.len(),
            contracts = fixture.contracts.len(),
            "Loaded chain fixture"
        );

        Ok(Self::from_fixture(fixture))
    }

    /// Register an address history; records are also indexed by tx id
    pub fn with_history(mut self, address: Address, txs: Vec<TransactionRecord>) -> Self {
        for tx in &txs {
            if let Some(id) = &tx.tx_id {
                self.by_id.entry(id.clone()).or_insert_with(|| tx.clone());
            }
        }
        self.histories.entry(address).or_default().extend(txs);
        self
    }

    pub fn with_transaction(mut self, tx: TransactionRecord) -> Self {
        if let Some(id) = tx.tx_id.clone() {
            self.by_id.insert(id, tx);
        }
        self
    }

    pub fn with_contract(mut self, contract_id: &ContractId, record: ContractRecord) -> Self {
        self.contracts.insert(contract_id.to_string(), record);
        self
    }

    pub fn with_events(mut self, contract_id: &ContractId, events: Vec<EventRecord>) -> Self {
        self.events
            .entry(contract_id.to_string())
            .or_default()
            .extend(events);
        self
    }

    pub fn with_block(mut self, height: u64, txs: Vec<TransactionRecord>) -> Self {
        self.blocks.entry(height).or_default().extend(txs);
        self
    }

    /// Number of trait calls served so far
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl ChainDataProvider for MemoryProvider {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get_transactions(
        &self,
        address: &Address,
        limit: u32,
        offset: u32,
    ) -> Vec<TransactionRecord> {
        self.record_call();
        let txs: Vec<TransactionRecord> = self
            .histories
            .get(address)
            .map(|h| {
                h.iter()
                    .skip(offset as usize)
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        debug!(address = %address.short(), count = txs.len(), "Served history");
        txs
    }

    async fn get_contract_info(&self, contract_id: &ContractId) -> Option<ContractRecord> {
        self.record_call();
        self.contracts.get(&contract_id.to_string()).cloned()
    }

    async fn get_transaction(&self, tx_id: &str) -> Option<TransactionRecord> {
        self.record_call();
        self.by_id.get(tx_id).cloned()
    }

    async fn get_contract_events(
        &self,
        contract_id: &ContractId,
        limit: u32,
    ) -> Vec<EventRecord> {
        self.record_call();
        self.events
            .get(&contract_id.to_string())
            .map(|e| e.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default()
    }

    async fn get_block_transactions(&self, height: u64, limit: u32) -> Vec<TransactionRecord> {
        self.record_call();
        self.blocks
            .get(&height)
            .map(|txs| txs.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn addr(n: u32) -> Address {
        Address::parse(&format!("SP{:0>39}", n)).unwrap()
    }

    #[tokio::test]
    async fn test_history_pagination() {
        let a = addr(1);
        let txs = (0..5)
            .map(|i| TransactionRecord::transfer(&format!("0x{}", i), &a, &addr(2), 1, 10, i))
            .collect();
        let provider = MemoryProvider::new().with_history(a.clone(), txs);

        assert_eq!(provider.get_transactions(&a, 2, 0).await.len(), 2);
        assert_eq!(provider.get_transactions(&a, 10, 3).await.len(), 2);
        assert!(provider.get_transactions(&addr(9), 10, 0).await.is_empty());
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_history_records_are_indexed_by_id() {
        let a = addr(1);
        let provider = MemoryProvider::new().with_history(
            a.clone(),
            vec![TransactionRecord::transfer("0xfeed", &a, &addr(2), 5, 1, 0)],
        );

        let tx = provider.get_transaction("0xfeed").await.unwrap();
        assert_eq!(tx.sender(), Some(&a));
        assert!(provider.get_transaction("0xmissing").await.is_none());
    }

    #[tokio::test]
    async fn test_fixture_file_roundtrip() {
        let a = addr(3);
        let mut fixture = Fixture::default();
        fixture.transactions.insert(
            a.to_string(),
            vec![TransactionRecord::call("0x10", &a, "SP000.x", 100, 5)],
        );
        fixture.contracts.insert(
            format!("{}.welsh", a),
            ContractRecord {
                tx_id: Some("0xdeploy".into()),
                ..Default::default()
            },
        );

        fixture.blocks.insert(
            7,
            vec![TransactionRecord::call("0x11", &a, "SP000.x", 100, 5); 3],
        );

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&fixture).unwrap().as_bytes())
            .unwrap();

        let provider = MemoryProvider::from_fixture_file(file.path()).unwrap();
        assert_eq!(provider.get_transactions(&a, 50, 0).await.len(), 1);
        assert_eq!(provider.get_block_transactions(7, 2).await.len(), 2);
        assert!(provider.get_block_transactions(8, 200).await.is_empty());

        let id = ContractId::parse(&format!("{}.welsh", a)).unwrap();
        let contract = provider.get_contract_info(&id).await.unwrap();
        assert_eq!(contract.tx_id.as_deref(), Some("0xdeploy"));
    }

    #[test]
    fn test_bad_fixture_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        assert!(matches!(
            MemoryProvider::from_fixture_file(file.path()),
            Err(Error::Deserialization(_))
        ));
    }
}
