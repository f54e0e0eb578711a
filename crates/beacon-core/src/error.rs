//! Error types for the Beacon overlay

use thiserror::Error;

/// Main error type for overlay operations
///
/// Receive-path variants (`Parse`, `Decryption`) are produced by the codecs
/// but never surfaced past the chat or discovery handlers: the shared topics
/// carry foreign traffic and those payloads are dropped.
#[derive(Error, Debug)]
pub enum BeaconError {
    /// The system random source could not produce key material
    #[error("Entropy unavailable: {0}")]
    Entropy(String),

    /// Content encryption failed
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Content decryption failed (wrong key, tampered data, malformed or empty result)
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// A wire payload could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Sending a chat message failed
    #[error("Send failed: {0}")]
    Send(String),

    /// Publish or subscribe on the underlying transport failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Address string is not a valid Beacon address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Bootstrap peer ticket is malformed
    #[error("Invalid peer ticket: {0}")]
    InvalidTicket(String),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using BeaconError
pub type BeaconResult<T> = Result<T, BeaconError>;

impl BeaconError {
    /// Wrap any lower-level failure on the send path as a `Send` error.
    pub(crate) fn into_send(self) -> Self {
        match self {
            BeaconError::Send(_) => self,
            other => BeaconError::Send(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BeaconError::Decryption("bad tag".to_string());
        assert_eq!(format!("{}", err), "Decryption failed: bad tag");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "stdin closed");
        let err: BeaconError = io_err.into();
        assert!(matches!(err, BeaconError::Io(_)));
    }

    #[test]
    fn test_into_send_wraps_cause() {
        let err = BeaconError::Transport("no route".to_string()).into_send();
        match err {
            BeaconError::Send(msg) => assert!(msg.contains("no route")),
            other => panic!("expected Send, got {:?}", other),
        }
    }

    #[test]
    fn test_into_send_keeps_send() {
        let err = BeaconError::Send("empty message".to_string()).into_send();
        assert_eq!(err.to_string(), "Send failed: empty message");
    }
}
