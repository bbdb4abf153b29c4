//! Stacks principal identifiers
//!
//! `Address` is the graph/map key used everywhere in the engine. Caller input
//! goes through [`Address::parse`]; addresses read back from the indexer are
//! taken as-is via [`Address::from_chain`] since recipients may be contract
//! principals that would not pass the standard-principal check.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Length of a mainnet standard principal
pub const ADDRESS_LEN: usize = 41;

/// Accepted mainnet version prefixes (single-sig, multi-sig)
pub const ADDRESS_PREFIXES: [&str; 2] = ["SP", "SM"];

/// Maximum length of a Clarity contract name
pub const MAX_CONTRACT_NAME_LEN: usize = 128;

lazy_static! {
    static ref CONTRACT_NAME: Regex =
        Regex::new(r"^[a-zA-Z]([a-zA-Z0-9]|[-_])*$").expect("contract name regex is valid");
}

/// c32 alphabet without the excluded I, L, O, U (either case)
fn is_c32_char(c: char) -> bool {
    c.is_ascii_alphanumeric() && !matches!(c.to_ascii_uppercase(), 'I' | 'L' | 'O' | 'U')
}

/// A Stacks address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Parse and validate a caller-supplied address (length, prefix, alphabet).
    /// The result is upper-cased, the form the indexer reports. No checksum
    /// verification is performed.
    pub fn parse(input: &str) -> Result<Self> {
        let upper = input.trim().to_ascii_uppercase();
        let input = upper.as_str();

        if input.len() != ADDRESS_LEN {
            return Err(Error::InvalidAddress(format!(
                "{} has length {}, expected {}",
                input,
                input.len(),
                ADDRESS_LEN
            )));
        }

        if !ADDRESS_PREFIXES.iter().any(|p| input.starts_with(p)) {
            return Err(Error::InvalidAddress(format!(
                "{} must start with one of {:?}",
                input, ADDRESS_PREFIXES
            )));
        }

        if let Some(bad) = input[2..].chars().find(|c| !is_c32_char(*c)) {
            return Err(Error::InvalidAddress(format!(
                "{} contains invalid character '{}'",
                input, bad
            )));
        }

        Ok(Self(upper))
    }

    /// Wrap an address reported by the chain indexer without validation
    pub fn from_chain(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Address {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A fully qualified contract identifier: `<address>.<contract-name>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContractId {
    deployer: Address,
    name: String,
}

impl ContractId {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let (addr, name) = input.split_once('.').ok_or_else(|| {
            Error::InvalidContractId(format!("{} is missing the '.<name>' suffix", input))
        })?;

        let deployer = Address::parse(addr)
            .map_err(|e| Error::InvalidContractId(format!("{}: {}", input, e)))?;

        if name.len() > MAX_CONTRACT_NAME_LEN || !CONTRACT_NAME.is_match(name) {
            return Err(Error::InvalidContractId(format!(
                "{} has an invalid contract name",
                input
            )));
        }

        Ok(Self {
            deployer,
            name: name.to_string(),
        })
    }

    /// Address that deployed the contract (the identifier's principal part)
    pub fn deployer(&self) -> &Address {
        &self.deployer
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for ContractId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.deployer, self.name)
    }
}

impl TryFrom<String> for ContractId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ContractId> for String {
    fn from(id: ContractId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARKADIKO: &str = "SP2C2YFP12AJZB4MABJBAJ55XECVS7E4PMMZ89YZR";

    #[test]
    fn test_parse_valid_address() {
        let addr = Address::parse(ARKADIKO).unwrap();
        assert_eq!(addr.as_str(), ARKADIKO);
        assert_eq!(addr.short(), "SP2C2YFP");
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let addr = Address::parse(&format!("  {} ", ARKADIKO)).unwrap();
        assert_eq!(addr.as_str(), ARKADIKO);
    }

    #[test]
    fn test_parse_canonicalizes_case() {
        let lower = Address::parse(&ARKADIKO.to_ascii_lowercase()).unwrap();
        assert_eq!(lower, Address::from_chain(ARKADIKO));
        assert_eq!(lower.as_str(), ARKADIKO);

        let mixed = format!("sP{}", &ARKADIKO[2..].to_ascii_lowercase());
        assert_eq!(Address::parse(&mixed).unwrap(), lower);

        let id = ContractId::parse(&format!("{}.Arkadiko-DAO", ARKADIKO.to_ascii_lowercase()))
            .unwrap();
        assert_eq!(id.deployer().as_str(), ARKADIKO);
        assert_eq!(id.name(), "Arkadiko-DAO");
    }

    #[test]
    fn test_reject_wrong_length() {
        assert!(Address::parse("SP2C2YFP12").is_err());
        assert!(Address::parse("").is_err());
    }

    #[test]
    fn test_reject_wrong_prefix() {
        let testnet = format!("ST{}", &ARKADIKO[2..]);
        assert!(matches!(
            Address::parse(&testnet),
            Err(Error::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_reject_excluded_characters() {
        for bad in ['I', 'L', 'O', 'U', 'o', '-'] {
            let candidate = format!("SP{}{}", bad, &ARKADIKO[3..]);
            assert!(Address::parse(&candidate).is_err(), "accepted {}", bad);
        }
    }

    #[test]
    fn test_from_chain_skips_validation() {
        let principal = Address::from_chain(format!("{}.arkadiko-dao", ARKADIKO));
        assert!(principal.as_str().ends_with(".arkadiko-dao"));
    }

    #[test]
    fn test_parse_contract_id() {
        let id = ContractId::parse(&format!("{}.arkadiko-dao", ARKADIKO)).unwrap();
        assert_eq!(id.deployer().as_str(), ARKADIKO);
        assert_eq!(id.name(), "arkadiko-dao");
        assert_eq!(id.to_string(), format!("{}.arkadiko-dao", ARKADIKO));
    }

    #[test]
    fn test_reject_bad_contract_ids() {
        assert!(ContractId::parse(ARKADIKO).is_err());
        assert!(ContractId::parse(&format!("{}.9lives", ARKADIKO)).is_err());
        assert!(ContractId::parse(&format!("{}.", ARKADIKO)).is_err());
        assert!(ContractId::parse("SPBAD.welsh-token").is_err());
    }

    #[test]
    fn test_contract_id_serde_roundtrip_as_string() {
        let raw = format!("\"{}.welsh-token\"", ARKADIKO);
        let id: ContractId = serde_json::from_str(&raw).unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), raw);
    }
}
