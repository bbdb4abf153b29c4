//! Chain indexer record types
//!
//! Field names follow the Hiro extended API. Every field is optional on the
//! wire; numeric quantities (fees, transfer amounts) arrive as JSON strings or
//! numbers and are normalized to `u64` micro-STX. Unparseable values become
//! `None` rather than failing the whole record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::address::Address;

/// Accept `"1000"`, `1000` or garbage (-> None)
fn lenient_u64<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
        Other(serde_json::Value),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(n)) => Some(n),
        Some(Raw::Text(s)) => s.trim().parse().ok(),
        Some(Raw::Other(_)) | None => None,
    })
}

/// Transaction kinds reported by the indexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    TokenTransfer,
    ContractCall,
    SmartContract,
    Coinbase,
    PoisonMicroblock,
    TenureChange,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenTransfer {
    #[serde(default)]
    pub recipient_address: Option<Address>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub amount: Option<u64>,
    #[serde(default)]
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractCall {
    #[serde(default)]
    pub contract_id: Option<String>,
    #[serde(default)]
    pub function_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmartContract {
    #[serde(default)]
    pub contract_id: Option<String>,
    #[serde(default)]
    pub source_code: Option<String>,
}

/// One transaction as returned by the address history and tx lookup endpoints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    #[serde(default)]
    pub tx_id: Option<String>,
    #[serde(default)]
    pub tx_type: Option<TxType>,
    #[serde(default)]
    pub sender_address: Option<Address>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub fee_rate: Option<u64>,
    #[serde(default)]
    pub nonce: Option<u64>,
    #[serde(default)]
    pub block_height: Option<u64>,
    /// Unix seconds
    #[serde(default)]
    pub burn_block_time: Option<i64>,
    #[serde(default)]
    pub burn_block_time_iso: Option<String>,
    #[serde(default)]
    pub token_transfer: Option<TokenTransfer>,
    #[serde(default)]
    pub contract_call: Option<ContractCall>,
    #[serde(default)]
    pub smart_contract: Option<SmartContract>,
}

impl TransactionRecord {
    /// STX transfer record
    pub fn transfer(
        tx_id: &str,
        sender: &Address,
        recipient: &Address,
        amount: u64,
        fee: u64,
        time: i64,
    ) -> Self {
        Self {
            tx_id: Some(tx_id.to_string()),
            tx_type: Some(TxType::TokenTransfer),
            sender_address: Some(sender.clone()),
            fee_rate: Some(fee),
            burn_block_time: Some(time),
            token_transfer: Some(TokenTransfer {
                recipient_address: Some(recipient.clone()),
                amount: Some(amount),
                memo: None,
            }),
            ..Default::default()
        }
    }

    /// Contract call record
    pub fn call(tx_id: &str, sender: &Address, contract_id: &str, fee: u64, time: i64) -> Self {
        Self {
            tx_id: Some(tx_id.to_string()),
            tx_type: Some(TxType::ContractCall),
            sender_address: Some(sender.clone()),
            fee_rate: Some(fee),
            burn_block_time: Some(time),
            contract_call: Some(ContractCall {
                contract_id: Some(contract_id.to_string()),
                function_name: None,
            }),
            ..Default::default()
        }
    }

    /// Set the account nonce
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn sender(&self) -> Option<&Address> {
        self.sender_address.as_ref()
    }

    pub fn is_token_transfer(&self) -> bool {
        self.tx_type == Some(TxType::TokenTransfer)
    }

    /// Transfer recipient (token transfers only)
    pub fn recipient(&self) -> Option<&Address> {
        self.token_transfer
            .as_ref()
            .and_then(|t| t.recipient_address.as_ref())
    }

    /// Transfer amount in micro-STX (token transfers only)
    pub fn amount(&self) -> Option<u64> {
        self.token_transfer.as_ref().and_then(|t| t.amount)
    }

    pub fn fee(&self) -> Option<u64> {
        self.fee_rate
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.burn_block_time
    }

    pub fn block_time(&self) -> Option<DateTime<Utc>> {
        self.burn_block_time
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
    }

    pub fn source_code(&self) -> Option<&str> {
        self.smart_contract
            .as_ref()
            .and_then(|c| c.source_code.as_deref())
    }
}

/// Contract metadata from `/extended/v1/contract/{id}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractRecord {
    #[serde(default)]
    pub contract_id: Option<String>,
    /// Deploy transaction
    #[serde(default)]
    pub tx_id: Option<String>,
    #[serde(default)]
    pub block_height: Option<u64>,
    #[serde(default)]
    pub source_code: Option<String>,
    #[serde(default)]
    pub canonical: Option<bool>,
}

/// Transaction summary embedded in a contract event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventTx {
    #[serde(default)]
    pub tx_id: Option<String>,
    #[serde(default)]
    pub sender_address: Option<Address>,
    #[serde(default)]
    pub burn_block_time_iso: Option<String>,
}

/// Contract event from `/extended/v1/contract/{id}/events`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default)]
    pub event_index: Option<u64>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub tx_id: Option<String>,
    #[serde(default)]
    pub tx: Option<EventTx>,
}

impl EventRecord {
    /// Calling address when the indexer embedded the transaction
    pub fn caller(&self) -> Option<&Address> {
        self.tx.as_ref().and_then(|t| t.sender_address.as_ref())
    }

    /// Transaction id from either the event or the embedded transaction
    pub fn transaction_id(&self) -> Option<&str> {
        self.tx_id
            .as_deref()
            .or_else(|| self.tx.as_ref().and_then(|t| t.tx_id.as_deref()))
    }
}

/// Paginated list envelope
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainTip {
    #[serde(default)]
    pub block_height: Option<u64>,
    #[serde(default)]
    pub burn_block_height: Option<u64>,
}

/// `/extended/v1/status`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexerStatus {
    #[serde(default)]
    pub server_version: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub chain_tip: Option<ChainTip>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hiro_transfer_with_string_amounts() {
        let raw = r#"{
            "tx_id": "0xabc",
            "tx_type": "token_transfer",
            "sender_address": "SP3FBR2AGK5H9QBDH3EEN6DF8EK8JY7RX8QJ5SVTE",
            "fee_rate": "180",
            "nonce": 7,
            "burn_block_time": 1700000000,
            "token_transfer": {
                "recipient_address": "SP2C2YFP12AJZB4MABJBAJ55XECVS7E4PMMZ89YZR",
                "amount": "2000000",
                "memo": "0x00"
            }
        }"#;

        let tx: TransactionRecord = serde_json::from_str(raw).unwrap();
        assert!(tx.is_token_transfer());
        assert_eq!(tx.fee(), Some(180));
        assert_eq!(tx.amount(), Some(2_000_000));
        assert_eq!(
            tx.recipient().map(|a| a.as_str()),
            Some("SP2C2YFP12AJZB4MABJBAJ55XECVS7E4PMMZ89YZR")
        );
        assert_eq!(tx.block_time().unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_numeric_amounts_and_missing_fields() {
        let tx: TransactionRecord =
            serde_json::from_str(r#"{"fee_rate": 250, "tx_type": "contract_call"}"#).unwrap();
        assert_eq!(tx.fee(), Some(250));
        assert_eq!(tx.tx_type, Some(TxType::ContractCall));
        assert!(tx.sender().is_none());
        assert!(tx.amount().is_none());
    }

    #[test]
    fn test_garbage_amount_is_absent() {
        let tx: TransactionRecord =
            serde_json::from_str(r#"{"fee_rate": "lots", "tx_type": "mystery"}"#).unwrap();
        assert!(tx.fee().is_none());
        assert_eq!(tx.tx_type, Some(TxType::Other));
    }

    #[test]
    fn test_event_caller_and_tx_id() {
        let raw = r#"{
            "event_index": 0,
            "event_type": "smart_contract_log",
            "tx_id": "0x01",
            "tx": {"sender_address": "SP2C2YFP12AJZB4MABJBAJ55XECVS7E4PMMZ89YZR"}
        }"#;
        let event: EventRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(event.transaction_id(), Some("0x01"));
        assert!(event.caller().is_some());

        let bare: EventRecord = serde_json::from_str(r#"{"event_type": "stx_asset"}"#).unwrap();
        assert!(bare.caller().is_none());
        assert!(bare.transaction_id().is_none());
    }

    #[test]
    fn test_page_envelope() {
        let page: Page<TransactionRecord> =
            serde_json::from_str(r#"{"limit": 50, "offset": 0, "total": 1, "results": [{}]}"#)
                .unwrap();
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.total, Some(1));
    }
}
