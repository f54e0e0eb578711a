//! Beacon Core Library
//!
//! Peer presence and end-to-end encrypted chat over shared pub/sub topics.
//!
//! ## Overview
//!
//! Every participant generates an identity at startup and joins two topics:
//!
//! - the **discovery** topic, where peers announce themselves, send a
//!   heartbeat every 10 seconds and answer announcements; anyone not heard
//!   from for 20 seconds is no longer counted as live
//! - the **chat** topic, where encrypted envelopes addressed by public
//!   address are broadcast and each peer keeps only those meant for it
//!
//! There is no server. The transport is a broadcast medium with no delivery
//! or ordering guarantees; the overlay tolerates loss, reordering and
//! duplication.
//!
//! ```text
//! Identity ──► DiscoveryEngine ──► PresenceTracker ──► PeerCountChanged
//!    │
//!    └──────► ChatChannel ──► seal/open (envelope, crypto) ──► MessageReceived
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use beacon_core::{Identity, MemoryTransport, OverlayConfig, OverlayNode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(MemoryTransport::new());
//!     let node = OverlayNode::start(transport, Identity::generate()?, OverlayConfig::default()).await?;
//!
//!     println!("My address: {}", node.address());
//!     println!("Live peers: {}", node.peer_count());
//!
//!     node.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Security
//!
//! The chat key is derived from the two public addresses alone (see
//! [`crypto`]). It hides content from passive observers who cannot link
//! addresses to a conversation, and nothing more.

pub mod chat;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod discovery;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod node;
pub mod presence;
pub mod transport;

// Re-exports
pub use chat::ChatChannel;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{OverlayConfig, HEARTBEAT_INTERVAL, PEER_TIMEOUT};
pub use discovery::{DiscoveryEngine, DiscoveryState};
pub use envelope::{ChatEnvelope, DecryptedMessage, DiscoverySignal, SignalKind};
pub use error::{BeaconError, BeaconResult};
pub use identity::{Address, Identity};
pub use node::{OverlayEvent, OverlayNode};
pub use presence::{PeerRecord, PresenceTracker};
pub use transport::{GossipTransport, MemoryTransport, PeerTicket, Subscription, Transport};
