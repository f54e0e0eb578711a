//! Gossip transport using iroh-gossip
//!
//! Each topic name maps to one gossip topic:
//!
//! ```text
//! topic_id = BLAKE3("beacon-topic-v1:" || topic_name)
//! ```
//!
//! A topic is joined lazily on first publish or subscribe. Received
//! payloads are fanned out to local subscribers through an in-process hub.
//! Gossip never delivers a node's own broadcasts back to it, so every
//! successful publish is also looped back into the hub; local subscribers see
//! their own traffic exactly as on a plain broadcast medium.

use std::collections::HashMap;
use std::sync::Arc;

use iroh::discovery::static_provider::StaticProvider;
use iroh::protocol::Router;
use iroh::{Endpoint, EndpointId, SecretKey};
use iroh_gossip::api::{Event, GossipReceiver, GossipSender};
use iroh_gossip::net::{Gossip, GOSSIP_ALPN};
use iroh_gossip::proto::TopicId;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{MemoryTransport, PeerTicket, Transport};
use crate::error::{BeaconError, BeaconResult};

/// Domain separation prefix for topic ids.
const TOPIC_PREFIX: &[u8] = b"beacon-topic-v1:";

/// Chat envelopes are small; 64KB leaves room for long messages.
const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Derive the gossip topic id for a topic name.
pub fn derive_topic_id(topic: &str) -> TopicId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(TOPIC_PREFIX);
    hasher.update(topic.as_bytes());
    TopicId::from_bytes(*hasher.finalize().as_bytes())
}

/// Transport backed by an iroh endpoint and gossip swarm.
pub struct GossipTransport {
    endpoint: Endpoint,
    gossip: Gossip,
    router: Router,
    /// Bootstrap peers used when joining each topic
    bootstrap: Vec<EndpointId>,
    senders: Mutex<HashMap<String, Arc<Mutex<GossipSender>>>>,
    /// Fan-out of received (and looped-back) payloads to local subscribers
    local: MemoryTransport,
    pumps: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl GossipTransport {
    /// Bind a fresh endpoint and spawn the gossip protocol.
    ///
    /// `bootstrap` peers are made known to the endpoint and used to join
    /// every topic. An empty list is fine for the first node.
    pub async fn bind(bootstrap: &[PeerTicket]) -> BeaconResult<Self> {
        let secret_key = SecretKey::generate(&mut rand::rng());

        // Static provider for out-of-band peer addresses from tickets
        let static_provider = StaticProvider::new();

        let endpoint = Endpoint::builder()
            .secret_key(secret_key)
            .alpns(vec![GOSSIP_ALPN.to_vec()])
            .discovery(static_provider.clone())
            .bind()
            .await
            .map_err(|e| BeaconError::Transport(format!("Failed to bind endpoint: {}", e)))?;

        info!(endpoint_id = %endpoint.id(), "Endpoint bound");

        let gossip = Gossip::builder()
            .max_message_size(MAX_MESSAGE_SIZE)
            .spawn(endpoint.clone());

        let router = Router::builder(endpoint.clone())
            .accept(GOSSIP_ALPN, gossip.clone())
            .spawn();

        let mut bootstrap_ids = Vec::with_capacity(bootstrap.len());
        for ticket in bootstrap {
            let addr = ticket.endpoint_addr()?;
            debug!(
                peer = %addr.id,
                relay = ?ticket.relay_url,
                addrs = ticket.direct_addresses.len(),
                "Adding bootstrap peer to static discovery"
            );
            bootstrap_ids.push(addr.id);
            static_provider.add_endpoint_info(addr);
        }

        Ok(Self {
            endpoint,
            gossip,
            router,
            bootstrap: bootstrap_ids,
            senders: Mutex::new(HashMap::new()),
            local: MemoryTransport::new(),
            pumps: parking_lot::Mutex::new(Vec::new()),
        })
    }

    /// This node's endpoint id.
    pub fn endpoint_id(&self) -> EndpointId {
        self.endpoint.id()
    }

    /// Ticket other nodes can use to bootstrap from this one.
    pub fn ticket(&self) -> PeerTicket {
        PeerTicket::from(&self.endpoint.addr())
    }

    /// Join `topic` if not yet joined and return its sender.
    async fn join(&self, topic: &str) -> BeaconResult<Arc<Mutex<GossipSender>>> {
        let mut senders = self.senders.lock().await;
        if let Some(sender) = senders.get(topic) {
            return Ok(sender.clone());
        }

        let topic_id = derive_topic_id(topic);
        info!(%topic, ?topic_id, peers = self.bootstrap.len(), "Joining gossip topic");

        let gossip_topic = self
            .gossip
            .subscribe(topic_id, self.bootstrap.clone())
            .await
            .map_err(|e| BeaconError::Transport(format!("Failed to subscribe: {}", e)))?;
        let (sender, receiver) = gossip_topic.split();

        let pump = tokio::spawn(pump_topic(topic.to_string(), receiver, self.local.clone()));
        self.pumps.lock().push(pump);

        let sender = Arc::new(Mutex::new(sender));
        senders.insert(topic.to_string(), sender.clone());
        Ok(sender)
    }

    /// Stop all topic pumps and close the endpoint.
    pub async fn shutdown(&self) {
        info!("Shutting down gossip transport");
        for pump in self.pumps.lock().drain(..) {
            pump.abort();
        }

        if let Err(e) = self.router.shutdown().await {
            warn!(error = ?e, "Failed to shutdown router cleanly");
        }
        self.endpoint.close().await;
    }
}

impl Transport for GossipTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> BeaconResult<()> {
        let sender = self.join(topic).await?;
        debug!(%topic, len = payload.len(), "Broadcasting");

        sender
            .lock()
            .await
            .broadcast(bytes::Bytes::from(payload.clone()))
            .await
            .map_err(|e| BeaconError::Transport(format!("Failed to broadcast: {}", e)))?;

        self.local.deliver(topic, payload);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> BeaconResult<mpsc::Receiver<Vec<u8>>> {
        self.join(topic).await?;
        self.local.subscribe(topic).await
    }
}

/// Forward gossip events for one topic into the local hub.
async fn pump_topic(topic: String, mut receiver: GossipReceiver, local: MemoryTransport) {
    use n0_future::StreamExt;

    loop {
        match receiver.try_next().await {
            Ok(Some(Event::Received(msg))) => {
                debug!(%topic, from = ?msg.delivered_from, len = msg.content.len(), "Received");
                local.deliver(&topic, msg.content.to_vec());
            }
            Ok(Some(Event::NeighborUp(peer))) => {
                info!(%topic, ?peer, "Neighbor joined");
            }
            Ok(Some(Event::NeighborDown(peer))) => {
                info!(%topic, ?peer, "Neighbor left");
            }
            Ok(Some(Event::Lagged)) => {
                warn!(%topic, "Lagged behind on topic");
            }
            Ok(None) => {
                debug!(%topic, "Topic subscription closed");
                break;
            }
            Err(e) => {
                warn!(%topic, error = ?e, "Error receiving from topic");
                break;
            }
        }
    }
}

impl std::fmt::Debug for GossipTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GossipTransport")
            .field("endpoint_id", &self.endpoint.id())
            .field("bootstrap", &self.bootstrap.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_topic_id_derivation() {
        assert_eq!(derive_topic_id("/a"), derive_topic_id("/a"));
        assert_ne!(derive_topic_id("/a"), derive_topic_id("/b"));
    }

    #[tokio::test]
    async fn test_bind_and_shutdown() {
        let transport = GossipTransport::bind(&[]).await.expect("bind");
        let ticket = transport.ticket();
        assert_eq!(&ticket.endpoint_id, transport.endpoint_id().as_bytes());
        transport.shutdown().await;
    }

    #[tokio::test]
    async fn test_own_publish_loops_back() {
        let transport = GossipTransport::bind(&[]).await.expect("bind");
        let mut rx = transport.subscribe("/test/loop").await.unwrap();

        // No neighbors: broadcast still succeeds and reaches local subscribers
        transport
            .publish("/test/loop", b"echo".to_vec())
            .await
            .unwrap();

        let payload = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out")
            .expect("stream closed");
        assert_eq!(payload, b"echo");

        transport.shutdown().await;
    }
}
