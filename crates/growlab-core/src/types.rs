//! Core type definitions for GrowLab
//!
//! Identities and transaction references are opaque strings supplied by
//! callers (wallet addresses and chain transaction hashes). Amounts are
//! fixed-point integers so that reward sums are exact.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::LabError;

/// Unix timestamp in seconds
pub type Timestamp = i64;

/// Token amount in base units
pub type Amount = u128;

/// Per-account reward weight
pub type Power = u64;

/// Token decimal places
pub const DECIMALS: u8 = 6;

/// One whole token in base units
pub const UNITS_PER_TOKEN: Amount = 1_000_000;

/// Convert a decimal token quantity into base units (rounded to the nearest unit)
pub fn tokens_to_units(tokens: f64) -> Amount {
    if !tokens.is_finite() || tokens <= 0.0 {
        return 0;
    }
    (tokens * UNITS_PER_TOKEN as f64).round() as Amount
}

/// Convert base units into a decimal token quantity for display
pub fn units_to_tokens(units: Amount) -> f64 {
    units as f64 / UNITS_PER_TOKEN as f64
}

/// Current wall-clock time in Unix seconds
pub fn now_timestamp() -> Timestamp {
    chrono::Utc::now().timestamp()
}

/// AccountId - participant identity (a wallet address)
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Maximum accepted identity length
    pub const MAX_LEN: usize = 128;

    /// Parse an identity, rejecting empty, oversized or whitespace-bearing input
    pub fn parse(raw: &str) -> Result<Self, LabError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(LabError::InvalidInput("missing address".to_string()));
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(LabError::InvalidInput(format!(
                "address exceeds {} characters",
                Self::MAX_LEN
            )));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(LabError::InvalidInput(
                "address contains whitespace".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.0)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// TxReference - external transaction identifier (hex transaction hash)
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxReference(String);

impl TxReference {
    /// Parse a transaction reference.
    ///
    /// References are normalized to lowercase so that the same hash submitted
    /// with different casing maps to the same ledger entry.
    pub fn parse(raw: &str) -> Result<Self, LabError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(LabError::InvalidInput("missing txHash".to_string()));
        }
        if !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(LabError::InvalidInput(format!(
                "txHash is not hex: {}",
                trimmed
            )));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TxReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxReference({})", self.0)
    }
}

impl fmt::Display for TxReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_parse() {
        assert!(AccountId::parse("addr_test1qz").is_ok());
        assert_eq!(AccountId::parse("  addr1 ").unwrap().as_str(), "addr1");
        assert!(AccountId::parse("").is_err());
        assert!(AccountId::parse("addr 1").is_err());
        assert!(AccountId::parse(&"a".repeat(200)).is_err());
    }

    #[test]
    fn test_tx_reference_normalized() {
        let a = TxReference::parse("ABCDEF01").unwrap();
        let b = TxReference::parse("abcdef01").unwrap();
        assert_eq!(a, b);
        assert!(TxReference::parse("not-a-hash").is_err());
        assert!(TxReference::parse("   ").is_err());
    }

    #[test]
    fn test_unit_conversion() {
        assert_eq!(tokens_to_units(0.5), 500_000);
        assert_eq!(tokens_to_units(-1.0), 0);
        assert_eq!(tokens_to_units(f64::NAN), 0);
        assert_eq!(units_to_tokens(2_500_000), 2.5);
    }
}
