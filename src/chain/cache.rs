//! Per-investigation memoizing provider
//!
//! The expander, funding tracer and overlap scan revisit the same addresses;
//! this wrapper makes each distinct request hit the upstream provider once.
//! Entries never expire since a cache lives only as long as one investigation.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::types::{ContractRecord, EventRecord, TransactionRecord};
use super::ChainDataProvider;
use crate::address::{Address, ContractId};

/// Cache statistics
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

pub struct CachedProvider {
    inner: Arc<dyn ChainDataProvider>,
    histories: DashMap<(Address, u32, u32), Vec<TransactionRecord>>,
    contracts: DashMap<ContractId, Option<ContractRecord>>,
    transactions: DashMap<String, Option<TransactionRecord>>,
    events: DashMap<(ContractId, u32), Vec<EventRecord>>,
    blocks: DashMap<(u64, u32), Vec<TransactionRecord>>,
    stats: CacheStats,
}

impl CachedProvider {
    pub fn new(inner: Arc<dyn ChainDataProvider>) -> Self {
        Self {
            inner,
            histories: DashMap::new(),
            contracts: DashMap::new(),
            transactions: DashMap::new(),
            events: DashMap::new(),
            blocks: DashMap::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Requests forwarded to the wrapped provider
    pub fn upstream_calls(&self) -> u64 {
        self.stats.misses.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ChainDataProvider for CachedProvider {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn get_transactions(
        &self,
        address: &Address,
        limit: u32,
        offset: u32,
    ) -> Vec<TransactionRecord> {
        let key = (address.clone(), limit, offset);
        if let Some(hit) = self.histories.get(&key) {
            self.stats.record_hit();
            return hit.clone();
        }

        self.stats.record_miss();
        let txs = self.inner.get_transactions(address, limit, offset).await;
        self.histories.insert(key, txs.clone());
        txs
    }

    async fn get_contract_info(&self, contract_id: &ContractId) -> Option<ContractRecord> {
        if let Some(hit) = self.contracts.get(contract_id) {
            self.stats.record_hit();
            return hit.clone();
        }

        self.stats.record_miss();
        let record = self.inner.get_contract_info(contract_id).await;
        self.contracts.insert(contract_id.clone(), record.clone());
        record
    }

    async fn get_transaction(&self, tx_id: &str) -> Option<TransactionRecord> {
        if let Some(hit) = self.transactions.get(tx_id) {
            self.stats.record_hit();
            return hit.clone();
        }

        self.stats.record_miss();
        let record = self.inner.get_transaction(tx_id).await;
        self.transactions.insert(tx_id.to_string(), record.clone());
        record
    }

    async fn get_contract_events(
        &self,
        contract_id: &ContractId,
        limit: u32,
    ) -> Vec<EventRecord> {
        let key = (contract_id.clone(), limit);
        if let Some(hit) = self.events.get(&key) {
            self.stats.record_hit();
            return hit.clone();
        }

        self.stats.record_miss();
        let events = self.inner.get_contract_events(contract_id, limit).await;
        self.events.insert(key, events.clone());
        events
    }

    async fn get_block_transactions(&self, height: u64, limit: u32) -> Vec<TransactionRecord> {
        let key = (height, limit);
        if let Some(hit) = self.blocks.get(&key) {
            self.stats.record_hit();
            return hit.clone();
        }

        self.stats.record_miss();
        let txs = self.inner.get_block_transactions(height, limit).await;
        self.blocks.insert(key, txs.clone());
        txs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MemoryProvider;

    #[tokio::test]
    async fn test_repeated_requests_hit_upstream_once() {
        let a = Address::parse("SP2C2YFP12AJZB4MABJBAJ55XECVS7E4PMMZ89YZR").unwrap();
        let b = Address::parse("SP3FBR2AGK5H9QBDH3EEN6DF8EK8JY7RX8QJ5SVTE").unwrap();
        let memory = Arc::new(MemoryProvider::new().with_history(
            a.clone(),
            vec![TransactionRecord::transfer("0x1", &b, &a, 10, 1, 0)],
        ));
        let cached = CachedProvider::new(memory.clone());

        for _ in 0..3 {
            assert_eq!(cached.get_transactions(&a, 50, 0).await.len(), 1);
        }
        // different page is a different key
        cached.get_transactions(&a, 100, 0).await;
        cached.get_transaction("0x1").await;
        cached.get_transaction("0x1").await;

        assert_eq!(memory.calls(), 3);
        assert_eq!(cached.upstream_calls(), 3);
        assert_eq!(cached.stats().hits.load(Ordering::Relaxed), 3);
        assert!((cached.stats().hit_rate() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_absent_records_are_memoized() {
        let memory = Arc::new(MemoryProvider::new());
        let cached = CachedProvider::new(memory.clone());
        let id =
            ContractId::parse("SP3NE50GEXFG9SZGTT51P40X2CKYSZ5CC4ZTZ7A2G.welsh-token").unwrap();

        assert!(cached.get_contract_info(&id).await.is_none());
        assert!(cached.get_contract_info(&id).await.is_none());
        assert!(cached.get_block_transactions(9, 200).await.is_empty());
        assert!(cached.get_block_transactions(9, 200).await.is_empty());
        assert_eq!(memory.calls(), 2);
    }
}
