//! Chain data providers
//!
//! The engine reads the chain exclusively through [`ChainDataProvider`].
//! Provider failures surface as "no data" (empty list / `None`); only the
//! concrete HTTP client knows about retries and rate limits.

use async_trait::async_trait;
use std::sync::Arc;

use crate::address::{Address, ContractId};

pub mod cache;
pub mod hiro;
pub mod memory;
pub mod types;

pub use cache::CachedProvider;
pub use hiro::HiroClient;
pub use memory::MemoryProvider;
pub use types::{ContractRecord, EventRecord, TransactionRecord, TxType};

/// Source of address histories, contract metadata and event logs
#[async_trait]
pub trait ChainDataProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    /// Transactions touching `address`, newest first
    async fn get_transactions(
        &self,
        address: &Address,
        limit: u32,
        offset: u32,
    ) -> Vec<TransactionRecord>;

    async fn get_contract_info(&self, contract_id: &ContractId) -> Option<ContractRecord>;

    async fn get_transaction(&self, tx_id: &str) -> Option<TransactionRecord>;

    async fn get_contract_events(&self, contract_id: &ContractId, limit: u32)
        -> Vec<EventRecord>;

    /// Transactions confirmed in the block at `height`
    async fn get_block_transactions(&self, height: u64, limit: u32) -> Vec<TransactionRecord>;
}

#[async_trait]
impl<P: ChainDataProvider + ?Sized> ChainDataProvider for Arc<P> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn get_transactions(
        &self,
        address: &Address,
        limit: u32,
        offset: u32,
    ) -> Vec<TransactionRecord> {
        (**self).get_transactions(address, limit, offset).await
    }

    async fn get_contract_info(&self, contract_id: &ContractId) -> Option<ContractRecord> {
        (**self).get_contract_info(contract_id).await
    }

    async fn get_transaction(&self, tx_id: &str) -> Option<TransactionRecord> {
        (**self).get_transaction(tx_id).await
    }

    async fn get_contract_events(
        &self,
        contract_id: &ContractId,
        limit: u32,
    ) -> Vec<EventRecord> {
        (**self).get_contract_events(contract_id, limit).await
    }

    async fn get_block_transactions(&self, height: u64, limit: u32) -> Vec<TransactionRecord> {
        (**self).get_block_transactions(height, limit).await
    }
}
