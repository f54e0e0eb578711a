//! Public addresses
//!
//! Format: `beacon:z{base58-blake3-hash}`
//!
//! The address is the BLAKE3 hash of the Ed25519 verifying key, so it is
//! stable for a given private key and does not reveal the key itself.

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::error::BeaconError;

const ADDRESS_PREFIX: &str = "beacon:z";

/// Length of the hash behind an address.
const ADDRESS_HASH_LEN: usize = 32;

/// Public identity of a participant.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Derive the address for a verifying key.
    pub fn from_public_key(public_key: &VerifyingKey) -> Self {
        let hash = blake3::hash(public_key.as_bytes());
        let encoded = bs58::encode(hash.as_bytes()).into_string();
        Address(format!("{}{}", ADDRESS_PREFIX, encoded))
    }

    /// Parse and validate an address string.
    pub fn parse(s: &str) -> Result<Self, BeaconError> {
        let s = s.trim();
        let identifier = s.strip_prefix(ADDRESS_PREFIX).ok_or_else(|| {
            BeaconError::InvalidAddress(format!(
                "expected '{}' prefix, got '{}'",
                ADDRESS_PREFIX,
                s.chars().take(12).collect::<String>()
            ))
        })?;

        let bytes = bs58::decode(identifier)
            .into_vec()
            .map_err(|e| BeaconError::InvalidAddress(format!("invalid base58: {}", e)))?;

        if bytes.len() != ADDRESS_HASH_LEN {
            return Err(BeaconError::InvalidAddress(format!(
                "expected {} byte hash, got {}",
                ADDRESS_HASH_LEN,
                bytes.len()
            )));
        }

        Ok(Address(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for display: first 8 characters of the identifier.
    pub fn short(&self) -> String {
        let identifier = &self.0[ADDRESS_PREFIX.len()..];
        if identifier.len() > 8 {
            format!("{}...", &identifier[..8])
        } else {
            identifier.to_string()
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = BeaconError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = BeaconError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
