//! Cluster Hunter Library
//!
//! Wallet clustering and evidence correlation over the Stacks transaction graph.

pub mod address;
pub mod analysis;
pub mod chain;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod error;
pub mod evidence;
pub mod mission;
pub mod report;
pub mod service;

// Re-export commonly used types
pub use address::{Address, ContractId};
pub use chain::ChainDataProvider;
pub use config::Config;
pub use error::{Error, Result};
pub use mission::{InvestigationFailure, InvestigationRequest, Investigator, MissionPhase, MissionState};
pub use report::InvestigationReport;
