//! Session identity keypair

use ed25519_dalek::SigningKey;

use crate::error::{BeaconError, BeaconResult};
use crate::identity::Address;

/// A participant's identity: an Ed25519 private key and the address derived
/// from it. One per running instance, never persisted.
pub struct Identity {
    signing_key: SigningKey,
    address: Address,
}

impl Identity {
    /// Generate a fresh identity from the OS random source.
    ///
    /// # Errors
    ///
    /// Returns `BeaconError::Entropy` if the random source is unavailable.
    pub fn generate() -> BeaconResult<Self> {
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed)
            .map_err(|e| BeaconError::Entropy(format!("Failed to get random bytes: {}", e)))?;
        Ok(Self::from_secret_bytes(&seed))
    }

    /// Rebuild an identity from a 32-byte private key.
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(secret);
        let address = Address::from_public_key(&signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Private key as lowercase hex.
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.signing_key.as_bytes())
    }
}

impl Clone for Identity {
    fn clone(&self) -> Self {
        Self::from_secret_bytes(self.signing_key.as_bytes())
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("address", &self.address)
            .field(
                "public_key",
                &hex::encode(self.signing_key.verifying_key().as_bytes()),
            )
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique() {
        let a = Identity::generate().unwrap();
        let b = Identity::generate().unwrap();
        assert_ne!(a.address(), b.address());
    }

    #[test]
    fn test_address_derived_from_key() {
        let a = Identity::from_secret_bytes(&[9u8; 32]);
        let b = Identity::from_secret_bytes(&[9u8; 32]);
        assert_eq!(a.address(), b.address());
        assert_eq!(a.private_key_hex(), b.private_key_hex());
    }

    #[test]
    fn test_clone_keeps_address() {
        let a = Identity::generate().unwrap();
        assert_eq!(a.clone().address(), a.address());
    }

    #[test]
    fn test_debug_hides_private_key() {
        let identity = Identity::from_secret_bytes(&[0xAB; 32]);
        let debug = format!("{:?}", identity);
        assert!(!debug.contains(&identity.private_key_hex()));
        assert!(debug.contains("beacon:z"));
    }
}
