//! Error types for the cluster hunter

use thiserror::Error;

use crate::mission::MissionPhase;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the cluster hunter
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Input validation errors
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid contract identifier: {0}")]
    InvalidContractId(String),

    #[error("Invalid investigation request: {0}")]
    InvalidRequest(String),

    // Chain indexer errors
    #[error("Indexer API error: {0}")]
    Api(String),

    #[error("Indexer API timeout after {0}ms")]
    ApiTimeout(u64),

    #[error("Indexer rate limited the request")]
    RateLimited,

    #[error("Indexer connection failed: {0}")]
    ApiConnection(String),

    #[error("Indexer rejected request with status {status}: {body}")]
    ApiRejected { status: u16, body: String },

    // Investigation errors
    #[error("Contract not found: {0}")]
    ContractNotFound(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Deploy transaction {0} has no sender")]
    DeployerMissing(String),

    #[error("Phase out of order: expected {expected}, got {got}")]
    PhaseOrder {
        expected: MissionPhase,
        got: MissionPhase,
    },

    #[error("Investigation cancelled before {0}")]
    Cancelled(MissionPhase),

    #[error("Investigation not found: {0}")]
    InvestigationNotFound(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Api(_) | Error::ApiTimeout(_) | Error::ApiConnection(_) | Error::RateLimited
        )
    }

    /// Check if this error came from caller-supplied input
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidAddress(_) | Error::InvalidContractId(_) | Error::InvalidRequest(_)
        )
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
