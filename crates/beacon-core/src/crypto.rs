//! Chat content encryption using ChaCha20-Poly1305 AEAD
//!
//! Each sender/recipient pair shares a symmetric key derived from the two
//! addresses. Content is sealed with a random nonce and carried on the wire
//! as a single base64 string.
//!
//! # Key derivation
//!
//! ```text
//! key = SHA-256(sender_address || recipient_address)
//! ```
//!
//! The order is the literal order carried in the envelope, not a sorted one:
//! the recipient re-derives the key from the envelope's own fields.
//!
//! Both inputs travel in clear text in every envelope, so anyone who
//! observes an envelope can derive its key. Content is hidden only from
//! parties that never see the addresses together. A real shared secret needs
//! an authenticated key exchange, which this protocol does not perform.
//!
//! # Wire Format
//!
//! `base64([nonce (12 bytes)] + [ciphertext + auth_tag (16 bytes)])`

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{BeaconError, BeaconResult};
use crate::identity::Address;

/// Nonce size for ChaCha20-Poly1305 (12 bytes)
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size for ChaCha20-Poly1305 (16 bytes)
pub const TAG_SIZE: usize = 16;

/// Symmetric key shared by one (sender, recipient) pair.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedKey([u8; 32]);

impl SharedKey {
    /// Derive the key for a sender/recipient pair.
    ///
    /// Not symmetric in its arguments: `derive(a, b) != derive(b, a)`.
    pub fn derive(sender: &Address, recipient: &Address) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(sender.as_str().as_bytes());
        hasher.update(recipient.as_str().as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedKey(..)")
    }
}

/// Content cipher bound to one shared key.
///
/// # Example
///
/// ```
/// use beacon_core::crypto::{ContentCipher, SharedKey};
/// use beacon_core::Identity;
///
/// let alice = Identity::generate().unwrap();
/// let bob = Identity::generate().unwrap();
///
/// let key = SharedKey::derive(alice.address(), bob.address());
/// let cipher = ContentCipher::new(&key);
///
/// let sealed = cipher.encrypt("hello").unwrap();
/// assert_eq!(cipher.decrypt(&sealed).unwrap(), "hello");
/// ```
pub struct ContentCipher {
    cipher: ChaCha20Poly1305,
}

impl ContentCipher {
    pub fn new(key: &SharedKey) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(key.as_bytes().into()),
        }
    }

    /// Encrypt a message into its transport string.
    ///
    /// A fresh random nonce is used for every call, so equal plaintexts
    /// produce different ciphertexts.
    ///
    /// # Errors
    ///
    /// Returns `BeaconError::Encryption` for an empty plaintext (it could
    /// never be decrypted, see [`decrypt`](Self::decrypt)) or if the AEAD
    /// fails.
    pub fn encrypt(&self, plaintext: &str) -> BeaconResult<String> {
        if plaintext.is_empty() {
            return Err(BeaconError::Encryption(
                "Refusing to encrypt empty content".to_string(),
            ));
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| BeaconError::Encryption(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(sealed))
    }

    /// Decrypt a transport string produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// Returns `BeaconError::Decryption` if the string is not valid base64,
    /// is too short, fails authentication (wrong key or tampering), is not
    /// UTF-8, or decrypts to an empty string.
    pub fn decrypt(&self, sealed: &str) -> BeaconResult<String> {
        let data = BASE64
            .decode(sealed.trim())
            .map_err(|e| BeaconError::Decryption(format!("Invalid base64: {}", e)))?;

        if data.len() < NONCE_SIZE + TAG_SIZE {
            return Err(BeaconError::Decryption(
                "Data too short to contain nonce and tag".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| BeaconError::Decryption(e.to_string()))?;

        let text = String::from_utf8(plaintext)
            .map_err(|_| BeaconError::Decryption("Content is not valid UTF-8".to_string()))?;

        if text.is_empty() {
            return Err(BeaconError::Decryption(
                "Decryption resulted in empty message".to_string(),
            ));
        }

        Ok(text)
    }
}

/// Derive the shared key for `(sender, recipient)`.
pub fn derive_shared_key(sender: &Address, recipient: &Address) -> SharedKey {
    SharedKey::derive(sender, recipient)
}

/// Encrypt content with a one-off cipher.
pub fn encrypt_content(plaintext: &str, key: &SharedKey) -> BeaconResult<String> {
    ContentCipher::new(key).encrypt(plaintext)
}

/// Decrypt content with a one-off cipher.
pub fn decrypt_content(sealed: &str, key: &SharedKey) -> BeaconResult<String> {
    ContentCipher::new(key).decrypt(sealed)
}
