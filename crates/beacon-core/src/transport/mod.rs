//! Publish/subscribe transport
//!
//! The overlay only needs two operations from the network: publish bytes on
//! a named topic and receive every payload published on a topic. Delivery is
//! best effort, unordered and may duplicate.
//!
//! ## Implementations
//!
//! - [`MemoryTransport`]: in-process hub, every subscriber (including the
//!   publisher) sees every publish. Used by tests and the CLI demo.
//! - [`GossipTransport`]: iroh endpoint + iroh-gossip swarm, one gossip
//!   topic per topic name.
//!
//! ## Subscriptions
//!
//! ```ignore
//! let receiver = transport.subscribe("/beacon/1/chat/json").await?;
//! let subscription = Subscription::spawn("/beacon/1/chat/json", receiver, |payload| {
//!     // handle payload...
//! });
//!
//! // Later, during shutdown
//! subscription.unsubscribe();
//! ```

mod gossip;
mod memory;
mod ticket;

pub use gossip::GossipTransport;
pub use memory::MemoryTransport;
pub use ticket::PeerTicket;

use std::future::Future;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::BeaconResult;

/// Buffer for payloads waiting to be handled by a subscription.
pub const SUBSCRIPTION_BUFFER: usize = 256;

/// Topic-based broadcast network.
pub trait Transport: Send + Sync + 'static {
    /// Publish `payload` to every subscriber of `topic`.
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> impl Future<Output = BeaconResult<()>> + Send;

    /// Start receiving payloads published on `topic`.
    ///
    /// The stream ends when the transport shuts down.
    fn subscribe(
        &self,
        topic: &str,
    ) -> impl Future<Output = BeaconResult<mpsc::Receiver<Vec<u8>>>> + Send;
}

/// A running topic subscription that owns its message handler.
///
/// The handler runs on a dedicated task until [`unsubscribe`](Self::unsubscribe)
/// is called, the subscription is dropped, or the payload stream ends.
pub struct Subscription {
    topic: String,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Subscription {
    /// Drive `handler` with every payload from `receiver`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(topic: impl Into<String>, mut receiver: mpsc::Receiver<Vec<u8>>, mut handler: F) -> Self
    where
        F: FnMut(Vec<u8>) + Send + 'static,
    {
        let topic = topic.into();
        let task_topic = topic.clone();
        let task = tokio::spawn(async move {
            while let Some(payload) = receiver.recv().await {
                handler(payload);
            }
            debug!(topic = %task_topic, "Subscription stream ended");
        });

        Self {
            topic,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Whether the handler task is still running.
    pub fn is_active(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stop delivering payloads. Safe to call more than once.
    pub fn unsubscribe(&self) {
        if let Some(task) = self.task.lock().take() {
            debug!(topic = %self.topic, "Unsubscribing");
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_subscription_delivers_until_unsubscribed() {
        let (tx, rx) = mpsc::channel(8);
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();

        let subscription = Subscription::spawn("t", rx, move |payload| sink.lock().push(payload));
        assert!(subscription.is_active());

        tx.send(b"one".to_vec()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(received.lock().len(), 1);

        subscription.unsubscribe();
        subscription.unsubscribe();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!subscription.is_active());

        // The receiver was dropped with the aborted task
        assert!(tx.send(b"two".to_vec()).await.is_err());
        assert_eq!(received.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_subscription_stops_handler() {
        let (tx, rx) = mpsc::channel(8);
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();

        let subscription = Subscription::spawn("t", rx, move |payload| sink.lock().push(payload));
        drop(subscription);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(tx.send(b"late".to_vec()).await.is_err());
        assert!(received.lock().is_empty());
    }

    #[tokio::test]
    async fn test_subscription_ends_with_stream() {
        let (tx, rx) = mpsc::channel(8);
        let subscription = Subscription::spawn("t", rx, |_| {});
        drop(tx);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!subscription.is_active());
        assert_eq!(subscription.topic(), "t");
    }
}
