//! Domain primitives: ChainId, EthAddress, EthTxHash, NetworkName.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Chain identifier as a lowercase `0x`-prefixed hex number (e.g. `0x1`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(String);

impl ChainId {
    /// Create a ChainId from its hex string form. The input is lowercased.
    pub fn new(id: impl Into<String>) -> Self {
        ChainId(id.into().to_lowercase())
    }

    /// Create a ChainId from the integer chain number.
    pub fn from_int(chain: u64) -> Self {
        ChainId(format!("{:#x}", chain))
    }

    /// Get the chain id as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid address: {0}")]
pub struct AddressParseError(pub String);

/// Validated 42-character lowercase hex address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EthAddress(String);

impl EthAddress {
    pub fn zero() -> Self {
        EthAddress(format!("0x{}", "0".repeat(40)))
    }

    /// Parse and normalize an address. Rejects anything but `0x` + 40 hex digits.
    pub fn parse(addr: &str) -> Result<Self, AddressParseError> {
        let lower = addr.trim().to_lowercase();
        let valid = lower.len() == 42
            && lower.starts_with("0x")
            && lower[2..].chars().all(|c| c.is_ascii_hexdigit());
        if !valid {
            return Err(AddressParseError(addr.to_string()));
        }
        Ok(EthAddress(lower))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for EthAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EthAddress::parse(s)
    }
}

impl TryFrom<String> for EthAddress {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        EthAddress::parse(&value)
    }
}

impl From<EthAddress> for String {
    fn from(addr: EthAddress) -> Self {
        addr.0
    }
}

impl std::fmt::Display for EthAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction hash. Lowercased; an invalid hash from the source is kept
/// empty rather than rejecting the row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EthTxHash(String);

impl EthTxHash {
    pub fn new(hash: &str) -> Self {
        let lower = hash.trim().to_lowercase();
        let valid = lower.len() == 66
            && lower.starts_with("0x")
            && lower[2..].chars().all(|c| c.is_ascii_hexdigit());
        if valid {
            EthTxHash(lower)
        } else {
            EthTxHash::default()
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EthTxHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Configured network label (e.g. "ethereum", "scroll").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkName(String);

impl NetworkName {
    pub fn new(name: impl Into<String>) -> Self {
        NetworkName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NetworkName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_from_int() {
        assert_eq!(ChainId::from_int(1).as_str(), "0x1");
        assert_eq!(ChainId::from_int(534352).as_str(), "0x82750");
        assert_eq!(ChainId::new("0xAA36A7"), ChainId::from_int(11155111));
    }

    #[test]
    fn test_address_normalizes_case() {
        let addr = EthAddress::parse("0xA0B86991C6218B36C1D19D4A2E9EB0CE3606EB48").unwrap();
        assert_eq!(addr.as_str(), "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
    }

    #[test]
    fn test_address_rejects_bad_input() {
        assert!(EthAddress::parse("0x123").is_err());
        assert!(EthAddress::parse("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb4800").is_err());
        assert!(EthAddress::parse("0xz0b86991c6218b36c1d19d4a2e9eb0ce3606eb48").is_err());
    }

    #[test]
    fn test_address_serde_validates() {
        let ok: Result<EthAddress, _> =
            serde_json::from_str("\"0x0000000000000000000000000000000000000001\"");
        assert!(ok.is_ok());
        let bad: Result<EthAddress, _> = serde_json::from_str("\"0x01\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_tx_hash_invalid_is_empty() {
        assert_eq!(EthTxHash::new("0xdead").as_str(), "");
        let full = format!("0x{}", "AB".repeat(32));
        assert_eq!(EthTxHash::new(&full).as_str(), full.to_lowercase());
    }
}
