//! Wire payloads for the discovery and chat topics
//!
//! Both payloads are UTF-8 JSON objects with a fixed field order, so that
//! independent implementations interoperate:
//!
//! ```text
//! DiscoverySignal  {"type":"announce"|"heartbeat"|"response","address":"beacon:z…","timestamp":1700000000000}
//! ChatEnvelope     {"ciphertext":"<base64>","senderAddress":"beacon:z…","recipientAddress":"beacon:z…","timestamp":"2024-01-01T00:00:00Z"}
//! ```
//!
//! Unknown fields are ignored so the format can grow (for example a message
//! identifier for de-duplication) without breaking older peers.
//!
//! ## Example
//!
//! ```
//! use beacon_core::envelope::ChatEnvelope;
//! use beacon_core::Identity;
//!
//! let alice = Identity::generate().unwrap();
//! let bob = Identity::generate().unwrap();
//!
//! let envelope = ChatEnvelope::seal("hello", alice.address(), bob.address()).unwrap();
//! let bytes = envelope.to_bytes().unwrap();
//!
//! let received = ChatEnvelope::from_bytes(&bytes).unwrap();
//! let message = received.open().unwrap();
//! assert_eq!(message.content, "hello");
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::{ContentCipher, SharedKey};
use crate::error::{BeaconError, BeaconResult};
use crate::identity::Address;

/// Kind of discovery signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    /// Sent once when a peer joins; every live peer answers with a `Response`
    Announce,
    /// Sent periodically while running
    Heartbeat,
    /// Reply to an `Announce`
    Response,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::Announce => write!(f, "announce"),
            SignalKind::Heartbeat => write!(f, "heartbeat"),
            SignalKind::Response => write!(f, "response"),
        }
    }
}

/// Liveness signal published on the discovery topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoverySignal {
    #[serde(rename = "type")]
    pub kind: SignalKind,
    /// Address of the peer emitting the signal
    pub address: Address,
    /// Sender's clock, Unix milliseconds
    pub timestamp: i64,
}

impl DiscoverySignal {
    pub fn new(kind: SignalKind, address: Address, timestamp: i64) -> Self {
        Self {
            kind,
            address,
            timestamp,
        }
    }

    /// Encode as JSON bytes.
    pub fn to_bytes(&self) -> BeaconResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| BeaconError::Parse(format!("Failed to encode signal: {}", e)))
    }

    /// Decode from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `BeaconError::Parse` for anything that is not a well-formed
    /// signal, including an invalid address.
    pub fn from_bytes(bytes: &[u8]) -> BeaconResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| BeaconError::Parse(format!("Failed to decode signal: {}", e)))
    }
}

/// Encrypted chat message as published on the chat topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEnvelope {
    /// Base64 ChaCha20-Poly1305 output, see [`crate::crypto`]
    pub ciphertext: String,
    pub sender_address: Address,
    pub recipient_address: Address,
    /// When the sender sealed the envelope (RFC 3339 on the wire)
    pub timestamp: DateTime<Utc>,
}

impl ChatEnvelope {
    /// Encrypt `plaintext` for `recipient` and wrap it in an envelope.
    ///
    /// # Errors
    ///
    /// Returns `BeaconError::Encryption` if the content cannot be encrypted.
    pub fn seal(plaintext: &str, sender: &Address, recipient: &Address) -> BeaconResult<Self> {
        let key = SharedKey::derive(sender, recipient);
        let ciphertext = ContentCipher::new(&key).encrypt(plaintext)?;

        Ok(Self {
            ciphertext,
            sender_address: sender.clone(),
            recipient_address: recipient.clone(),
            timestamp: Utc::now(),
        })
    }

    /// Decrypt with the key derived from this envelope's own address fields.
    ///
    /// # Errors
    ///
    /// Returns `BeaconError::Decryption` if the ciphertext does not open
    /// under that key.
    pub fn open(&self) -> BeaconResult<DecryptedMessage> {
        let key = SharedKey::derive(&self.sender_address, &self.recipient_address);
        let content = ContentCipher::new(&key).decrypt(&self.ciphertext)?;

        Ok(DecryptedMessage {
            content,
            timestamp: self.timestamp,
            sender_address: self.sender_address.clone(),
            recipient_address: self.recipient_address.clone(),
        })
    }

    /// Encode as JSON bytes.
    pub fn to_bytes(&self) -> BeaconResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| BeaconError::Parse(format!("Failed to encode envelope: {}", e)))
    }

    /// Decode from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns `BeaconError::Parse` if the bytes are not a chat envelope.
    pub fn from_bytes(bytes: &[u8]) -> BeaconResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| BeaconError::Parse(format!("Failed to decode envelope: {}", e)))
    }

    /// Whether `address` takes part in this envelope as sender or recipient.
    pub fn involves(&self, address: &Address) -> bool {
        &self.recipient_address == address || &self.sender_address == address
    }
}

/// A chat message after decryption. Handed to the UI, not retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptedMessage {
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub sender_address: Address,
    pub recipient_address: Address,
}

impl DecryptedMessage {
    /// Whether this is the echo of a message `me` sent.
    pub fn is_mine(&self, me: &Address) -> bool {
        &self.sender_address == me
    }
}
