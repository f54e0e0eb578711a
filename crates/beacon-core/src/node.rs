//! One running overlay participant
//!
//! [`OverlayNode`] wires a single identity to one presence tracker, one
//! discovery engine and one chat channel on a shared transport, and turns the
//! two UI callbacks (peer count changed, message received) into a broadcast
//! stream of [`OverlayEvent`]s.
//!
//! ```ignore
//! let node = OverlayNode::start(Arc::new(transport), Identity::generate()?, OverlayConfig::default()).await?;
//! let mut events = node.subscribe();
//!
//! node.send_message(&bob, "hello").await?;
//! while let Ok(event) = events.recv().await {
//!     // render...
//! }
//!
//! node.shutdown();
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use crate::chat::ChatChannel;
use crate::clock::{Clock, SystemClock};
use crate::config::OverlayConfig;
use crate::discovery::{DiscoveryEngine, DiscoveryState};
use crate::envelope::{ChatEnvelope, DecryptedMessage};
use crate::error::BeaconResult;
use crate::identity::{Address, Identity};
use crate::presence::{PeerRecord, PresenceTracker};
use crate::transport::Transport;

/// Capacity of the event broadcast channel.
const EVENT_CAPACITY: usize = 256;

/// Notification for UI consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayEvent {
    /// Live remote peer count changed
    PeerCountChanged(usize),
    /// A chat message addressed to or sent by this node arrived
    MessageReceived(DecryptedMessage),
}

pub struct OverlayNode<T: Transport> {
    identity: Identity,
    config: OverlayConfig,
    tracker: Arc<PresenceTracker>,
    discovery: DiscoveryEngine<T>,
    chat: ChatChannel<T>,
    events: broadcast::Sender<OverlayEvent>,
    shut_down: AtomicBool,
}

impl<T: Transport> OverlayNode<T> {
    /// Validate `config`, start listening for chat and start discovery.
    pub async fn start(
        transport: Arc<T>,
        identity: Identity,
        config: OverlayConfig,
    ) -> BeaconResult<Self> {
        Self::start_with_clock(transport, identity, config, Arc::new(SystemClock)).await
    }

    /// Like [`start`](Self::start) with an explicit liveness clock.
    pub async fn start_with_clock(
        transport: Arc<T>,
        identity: Identity,
        config: OverlayConfig,
        clock: Arc<dyn Clock>,
    ) -> BeaconResult<Self> {
        config.validate()?;

        let address = identity.address().clone();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let tracker = Arc::new(PresenceTracker::new(
            address.clone(),
            config.peer_timeout_ms(),
            clock.clone(),
        ));
        let count_events = events.clone();
        tracker.on_count_changed(move |count| {
            let _ = count_events.send(OverlayEvent::PeerCountChanged(count));
        });

        let chat = ChatChannel::new(transport.clone(), address.clone(), &config);
        let message_events = events.clone();
        chat.listen(move |message| {
            let _ = message_events.send(OverlayEvent::MessageReceived(message));
        })
        .await?;

        let discovery =
            DiscoveryEngine::new(transport, address.clone(), &config, tracker.clone(), clock);
        if let Err(e) = discovery.start().await {
            chat.stop();
            return Err(e);
        }

        info!(address = %address, "Overlay node started");

        Ok(Self {
            identity,
            config,
            tracker,
            discovery,
            chat,
            events,
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn address(&self) -> &Address {
        self.identity.address()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    /// Number of live remote peers.
    pub fn peer_count(&self) -> usize {
        self.tracker.live_count()
    }

    /// Users on the topic including this node.
    pub fn users_in_topic(&self) -> usize {
        self.peer_count() + 1
    }

    pub fn live_peers(&self) -> Vec<PeerRecord> {
        self.tracker.live_peers()
    }

    pub fn discovery_state(&self) -> DiscoveryState {
        self.discovery.state()
    }

    /// Encrypt and publish `plaintext` for `recipient`.
    pub async fn send_message(
        &self,
        recipient: &Address,
        plaintext: &str,
    ) -> BeaconResult<ChatEnvelope> {
        self.chat.send(plaintext, recipient).await
    }

    /// Receive events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<OverlayEvent> {
        self.events.subscribe()
    }

    /// Stop discovery and chat delivery. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.discovery.cleanup();
        self.chat.stop();
        info!(address = %self.address().short(), "Overlay node shut down");
    }
}

impl<T: Transport> std::fmt::Debug for OverlayNode<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayNode")
            .field("address", self.address())
            .field("discovery", &self.discovery.state())
            .finish_non_exhaustive()
    }
}
