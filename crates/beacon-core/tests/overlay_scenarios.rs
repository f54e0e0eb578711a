//! End-to-end overlay scenarios
//!
//! Several nodes share one in-memory transport. Tokio time is paused so the
//! heartbeat timer can be driven deterministically, and liveness uses a
//! `ManualClock` advanced in step with it.

use std::sync::Arc;
use std::time::Duration;

use beacon_core::{
    ChatEnvelope, DiscoverySignal, Identity, ManualClock, MemoryTransport, OverlayConfig,
    OverlayEvent, OverlayNode, SignalKind, Transport, HEARTBEAT_INTERVAL, PEER_TIMEOUT,
};
use tokio::sync::broadcast;

// ============================================================================
// Test Utilities
// ============================================================================

struct Harness {
    transport: Arc<MemoryTransport>,
    clock: Arc<ManualClock>,
    config: OverlayConfig,
}

impl Harness {
    fn new() -> Self {
        Self {
            transport: Arc::new(MemoryTransport::new()),
            clock: Arc::new(ManualClock::new(1_700_000_000_000)),
            config: OverlayConfig::default(),
        }
    }

    async fn node(&self) -> OverlayNode<MemoryTransport> {
        OverlayNode::start_with_clock(
            self.transport.clone(),
            Identity::generate().unwrap(),
            self.config.clone(),
            self.clock.clone(),
        )
        .await
        .unwrap()
    }

    /// Advance both tokio time and the liveness clock.
    async fn advance(&self, by: Duration) {
        tokio::time::sleep(by).await;
        self.clock.advance(by);
    }

    fn signals(&self) -> Vec<DiscoverySignal> {
        self.transport
            .published(&self.config.discovery_topic)
            .iter()
            .map(|bytes| DiscoverySignal::from_bytes(bytes).unwrap())
            .collect()
    }
}

/// Let spawned handlers run.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

fn drain(rx: &mut broadcast::Receiver<OverlayEvent>) -> Vec<OverlayEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn messages(events: &[OverlayEvent]) -> Vec<&beacon_core::DecryptedMessage> {
    events
        .iter()
        .filter_map(|e| match e {
            OverlayEvent::MessageReceived(m) => Some(m),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Chat Scenarios
// ============================================================================

/// A sends "hello" to B; B decrypts it with both addresses intact
#[tokio::test(start_paused = true)]
async fn test_hello_reaches_recipient() {
    let harness = Harness::new();
    let alice = harness.node().await;
    let bob = harness.node().await;
    let mut bob_events = bob.subscribe();

    alice.send_message(bob.address(), "hello").await.unwrap();
    settle().await;

    let events = drain(&mut bob_events);
    let received = messages(&events);
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].content, "hello");
    assert_eq!(&received[0].sender_address, alice.address());
    assert_eq!(&received[0].recipient_address, bob.address());
    assert!(!received[0].is_mine(bob.address()));
}

/// The sender sees its own message echoed back; bystanders see nothing
#[tokio::test(start_paused = true)]
async fn test_echo_and_bystander() {
    let harness = Harness::new();
    let alice = harness.node().await;
    let bob = harness.node().await;
    let carol = harness.node().await;
    let mut alice_events = alice.subscribe();
    let mut carol_events = carol.subscribe();

    alice.send_message(bob.address(), "just for bob").await.unwrap();
    settle().await;

    let echo = drain(&mut alice_events);
    let echo = messages(&echo);
    assert_eq!(echo.len(), 1);
    assert!(echo[0].is_mine(alice.address()));

    assert!(messages(&drain(&mut carol_events)).is_empty());
}

/// Duplicated envelopes are delivered once per copy
#[tokio::test(start_paused = true)]
async fn test_duplicate_envelope_delivered_twice() {
    let harness = Harness::new();
    let alice = harness.node().await;
    let bob = harness.node().await;
    let mut bob_events = bob.subscribe();

    let envelope = ChatEnvelope::seal("twice", alice.address(), bob.address()).unwrap();
    let bytes = envelope.to_bytes().unwrap();
    for _ in 0..2 {
        harness
            .transport
            .publish(&harness.config.chat_topic, bytes.clone())
            .await
            .unwrap();
    }
    settle().await;

    assert_eq!(messages(&drain(&mut bob_events)).len(), 2);
}

/// Foreign traffic on the chat topic is dropped without disturbing delivery
#[tokio::test(start_paused = true)]
async fn test_noise_on_chat_topic() {
    let harness = Harness::new();
    let alice = harness.node().await;
    let bob = harness.node().await;
    let mut bob_events = bob.subscribe();

    let topic = harness.config.chat_topic.clone();
    for noise in [&b"garbage"[..], b"{}", b"{\"ciphertext\":\"AAAA\"}"] {
        harness.transport.publish(&topic, noise.to_vec()).await.unwrap();
    }
    alice.send_message(bob.address(), "still works").await.unwrap();
    settle().await;

    let events = drain(&mut bob_events);
    let received = messages(&events);
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].content, "still works");
}

// ============================================================================
// Discovery Scenarios
// ============================================================================

/// B is running; A joins and announces; B responds once and A counts B
#[tokio::test(start_paused = true)]
async fn test_announce_answered_within_round_trip() {
    let harness = Harness::new();
    let bob = harness.node().await;
    let alice = harness.node().await;
    settle().await;

    assert_eq!(alice.peer_count(), 1);
    assert_eq!(bob.peer_count(), 1);
    assert_eq!(alice.users_in_topic(), 2);

    let bob_responses = harness
        .signals()
        .into_iter()
        .filter(|s| &s.address == bob.address() && s.kind == SignalKind::Response)
        .count();
    assert_eq!(bob_responses, 1);

    // Bob's announce went out before Alice subscribed, so Alice never responds
    let alice_responses = harness
        .signals()
        .into_iter()
        .filter(|s| &s.address == alice.address() && s.kind == SignalKind::Response)
        .count();
    assert_eq!(alice_responses, 0);
}

/// Heartbeats keep a peer live indefinitely
#[tokio::test(start_paused = true)]
async fn test_heartbeats_keep_peers_live() {
    let harness = Harness::new();
    let alice = harness.node().await;
    let bob = harness.node().await;
    settle().await;

    for _ in 0..12 {
        harness.advance(HEARTBEAT_INTERVAL / 2).await;
        assert_eq!(alice.peer_count(), 1);
        assert_eq!(bob.peer_count(), 1);
    }
}

/// After B stops, A stops counting B once the timeout has passed
#[tokio::test(start_paused = true)]
async fn test_halted_peer_times_out() {
    let harness = Harness::new();
    let alice = harness.node().await;
    let bob = harness.node().await;
    let mut alice_events = alice.subscribe();
    settle().await;
    assert_eq!(alice.peer_count(), 1);

    bob.shutdown();

    let mut elapsed = Duration::ZERO;
    while elapsed <= PEER_TIMEOUT + HEARTBEAT_INTERVAL {
        harness.advance(HEARTBEAT_INTERVAL / 2).await;
        elapsed += HEARTBEAT_INTERVAL / 2;
    }

    assert_eq!(alice.peer_count(), 0);
    assert!(alice.live_peers().is_empty());
    assert!(drain(&mut alice_events).contains(&OverlayEvent::PeerCountChanged(0)));
}

/// A peer that shuts down cleanly stops publishing entirely
#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_heartbeats() {
    let harness = Harness::new();
    let alice = harness.node().await;
    alice.shutdown();

    let before = harness.signals().len();
    harness.advance(HEARTBEAT_INTERVAL * 4).await;
    assert_eq!(harness.signals().len(), before);
}
