//! Peer tickets for joining a gossip swarm
//!
//! A ticket is a serialized iroh endpoint address that one node shares with
//! another so the second node has somewhere to start. Tickets are encoded as
//! `beacon-peer:{base58}` strings for copy-paste.

use std::net::SocketAddr;

use iroh::{EndpointAddr, PublicKey, RelayUrl};
use serde::{Deserialize, Serialize};

use crate::error::{BeaconError, BeaconResult};

/// Prefix for encoded ticket strings
const TICKET_PREFIX: &str = "beacon-peer:";

/// What a joining node needs to dial one existing member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerTicket {
    pub endpoint_id: [u8; 32],
    /// First relay of the member, if it has one
    pub relay_url: Option<String>,
    pub direct_addresses: Vec<SocketAddr>,
}

impl From<&EndpointAddr> for PeerTicket {
    fn from(addr: &EndpointAddr) -> Self {
        Self {
            endpoint_id: *addr.id.as_bytes(),
            relay_url: addr.relay_urls().next().map(ToString::to_string),
            direct_addresses: addr.ip_addrs().copied().collect(),
        }
    }
}

impl PeerTicket {
    /// The dialable iroh address this ticket names.
    ///
    /// # Errors
    ///
    /// Returns `BeaconError::InvalidTicket` if the key or relay URL is malformed.
    pub fn endpoint_addr(&self) -> BeaconResult<EndpointAddr> {
        let id = PublicKey::from_bytes(&self.endpoint_id)
            .map_err(|e| BeaconError::InvalidTicket(format!("Invalid public key: {}", e)))?;
        let relay = self
            .relay_url
            .as_deref()
            .map(str::parse::<RelayUrl>)
            .transpose()
            .map_err(|e| BeaconError::InvalidTicket(format!("Invalid relay URL: {}", e)))?;

        let addr = relay.into_iter().fold(EndpointAddr::new(id), EndpointAddr::with_relay_url);
        Ok(self
            .direct_addresses
            .iter()
            .copied()
            .fold(addr, EndpointAddr::with_ip_addr))
    }

    /// Encode as a `beacon-peer:{base58}` string.
    pub fn encode(&self) -> BeaconResult<String> {
        let bytes = postcard::to_stdvec(self)
            .map_err(|e| BeaconError::InvalidTicket(format!("Failed to encode ticket: {}", e)))?;
        Ok(format!(
            "{}{}",
            TICKET_PREFIX,
            bs58::encode(&bytes).into_string()
        ))
    }

    /// Decode a `beacon-peer:{base58}` string.
    ///
    /// The result always converts to an [`EndpointAddr`].
    pub fn decode(s: &str) -> BeaconResult<Self> {
        let s = s.trim();
        let data = s.strip_prefix(TICKET_PREFIX).ok_or_else(|| {
            BeaconError::InvalidTicket(format!(
                "Invalid prefix: expected '{}', got '{}'",
                TICKET_PREFIX,
                s.chars().take(15).collect::<String>()
            ))
        })?;

        let bytes = bs58::decode(data)
            .into_vec()
            .map_err(|e| BeaconError::InvalidTicket(format!("Invalid base58: {}", e)))?;

        let ticket: Self = postcard::from_bytes(&bytes)
            .map_err(|e| BeaconError::InvalidTicket(format!("Invalid ticket data: {}", e)))?;
        ticket.endpoint_addr()?;
        Ok(ticket)
    }
}

impl std::str::FromStr for PeerTicket {
    type Err = BeaconError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_ticket() -> PeerTicket {
        let key = iroh::SecretKey::generate(&mut rand::rng());
        PeerTicket {
            endpoint_id: *key.public().as_bytes(),
            relay_url: Some("https://relay.example.com/".to_string()),
            direct_addresses: vec!["192.168.1.7:4433".parse().unwrap()],
        }
    }

    #[test]
    fn test_encode_decode() {
        let ticket = test_ticket();
        let encoded = ticket.encode().unwrap();
        assert!(encoded.starts_with("beacon-peer:"));
        assert_eq!(PeerTicket::decode(&encoded).unwrap(), ticket);
    }

    #[test]
    fn test_decode_rejects_prefix() {
        let result = PeerTicket::decode("sync-invite:abc");
        match result {
            Err(BeaconError::InvalidTicket(msg)) => assert!(msg.contains("prefix")),
            other => panic!("Expected InvalidTicket, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(PeerTicket::decode("beacon-peer:0OIl").is_err());
        assert!(PeerTicket::decode("beacon-peer:2").is_err());
    }

    #[test]
    fn test_endpoint_addr_conversion() {
        let ticket = test_ticket();
        let addr = ticket.endpoint_addr().unwrap();
        assert_eq!(addr.id.as_bytes(), &ticket.endpoint_id);

        let back = PeerTicket::from(&addr);
        assert_eq!(back.endpoint_id, ticket.endpoint_id);
        assert_eq!(back.direct_addresses, ticket.direct_addresses);
        assert!(back.relay_url.is_some());
    }

    #[test]
    fn test_decode_rejects_bad_relay() {
        let mut ticket = test_ticket();
        ticket.relay_url = Some("not a url".to_string());
        assert!(matches!(
            ticket.endpoint_addr(),
            Err(BeaconError::InvalidTicket(_))
        ));

        let encoded = ticket.encode().unwrap();
        match PeerTicket::decode(&encoded) {
            Err(BeaconError::InvalidTicket(msg)) => assert!(msg.contains("relay")),
            other => panic!("Expected InvalidTicket, got {:?}", other),
        }
    }
}
