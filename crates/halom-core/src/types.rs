//! Core type definitions for the Halom protocol
//!
//! Token amounts use 9 decimals, the HOI index is a 1e9 fixed-point value and
//! the rebase multiplier and reward accumulator use a 1e18 scale.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Token amount in the smallest unit (1 HOM = 1e9 units)
pub type Balance = u128;

/// HOI index value, fixed point with [`INDEX_SCALE`]
pub type IndexValue = u128;

/// Consensus round identifier
pub type RoundId = u64;

/// Unix timestamp in seconds
pub type Timestamp = i64;

/// Basis points (10_000 = 100%)
pub type BasisPoints = u32;

/// Decimal places of the HOM token
pub const TOKEN_DECIMALS: u8 = 9;

/// One HOM in smallest units
pub const ONE_HOM: Balance = 1_000_000_000;

/// Fixed-point scale of index values (1.0 == 1e9)
pub const INDEX_SCALE: IndexValue = 1_000_000_000;

/// Fixed-point scale of the rebase multiplier and reward accumulator
pub const SCALE: u128 = 1_000_000_000_000_000_000;

/// Denominator for basis point math
pub const BPS_DENOMINATOR: u128 = 10_000;

/// AccountId - 32-byte identity of a holder, reporter, updater or validator
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct AccountId {
    id: [u8; 32],
}

impl AccountId {
    pub const fn new(id: [u8; 32]) -> Self {
        Self { id }
    }

    /// Derive a deterministic account from a human label (BLAKE3)
    pub fn from_label(label: &str) -> Self {
        Self {
            id: *blake3::hash(label.as_bytes()).as_bytes(),
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.id
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.id)
    }

    /// Parse from hex, with or without a `0x` prefix
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut id = [0u8; 32];
        id.copy_from_slice(&bytes);
        Ok(Self { id })
    }

    pub const ZERO: Self = Self { id: [0u8; 32] };
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl From<[u8; 32]> for AccountId {
    fn from(id: [u8; 32]) -> Self {
        Self::new(id)
    }
}

impl From<AccountId> for String {
    fn from(account: AccountId) -> Self {
        account.to_hex()
    }
}

impl TryFrom<String> for AccountId {
    type Error = hex::FromHexError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

/// How a consensus round arrived at its value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMethod {
    /// Median of at least `min_consensus_feeds` submissions
    Median,
    /// Confidence-weighted mean of a sub-threshold round (lower confidence)
    Fallback,
}

impl ResolutionMethod {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Median => "median",
            Self::Fallback => "fallback",
        }
    }

    pub fn is_low_confidence(&self) -> bool {
        matches!(self, Self::Fallback)
    }
}

impl fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Snapshot of the published index
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub value: IndexValue,
    pub nonce: u64,
    pub updated_at: Timestamp,
}

/// Staking view exposed to collaborators
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeInfo {
    /// Nominal staked amount
    pub staked: Balance,
    /// Fourth-root reward weight
    pub weight: u128,
    /// Validator the stake is delegated to
    pub delegation: Option<AccountId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_hex_roundtrip() {
        let account = AccountId::from_label("alice");
        let parsed = AccountId::from_hex(&account.to_hex()).unwrap();
        assert_eq!(account, parsed);

        let prefixed = format!("0x{}", account.to_hex());
        assert_eq!(AccountId::from_hex(&prefixed).unwrap(), account);
    }

    #[test]
    fn test_account_hex_rejects_short_input() {
        assert!(AccountId::from_hex("abcd").is_err());
    }

    #[test]
    fn test_account_serializes_as_hex_key() {
        let account = AccountId::from_label("alice");
        let json = serde_json::to_string(&account).unwrap();
        assert_eq!(json, format!("\"{}\"", account.to_hex()));

        let mut balances = std::collections::HashMap::new();
        balances.insert(account, 5u64);
        let json = serde_json::to_string(&balances).unwrap();
        let parsed: std::collections::HashMap<AccountId, u64> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[&account], 5);
    }

    #[test]
    fn test_labels_are_distinct() {
        assert_ne!(AccountId::from_label("alice"), AccountId::from_label("bob"));
        assert_ne!(AccountId::from_label("alice"), AccountId::ZERO);
    }

    #[test]
    fn test_resolution_method_serde() {
        let json = serde_json::to_string(&ResolutionMethod::Fallback).unwrap();
        assert_eq!(json, "\"fallback\"");
        assert!(ResolutionMethod::Fallback.is_low_confidence());
        assert!(!ResolutionMethod::Median.is_low_confidence());
    }
}
