//! In-process transport
//!
//! A hub of `tokio::sync::broadcast` channels keyed by topic name. Clones
//! share the hub, so several overlay nodes in one process can talk to each
//! other through it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use super::{Transport, SUBSCRIPTION_BUFFER};
use crate::error::{BeaconError, BeaconResult};

/// Capacity of each per-topic broadcast channel.
const TOPIC_CAPACITY: usize = 1024;

/// Payloads kept per topic in the publish log; older ones are dropped.
pub const PUBLISHED_LOG_LIMIT: usize = 1024;

#[derive(Default)]
struct Hub {
    topics: Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>,
    /// Most recent payloads published, per topic
    published: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    fail_publishes: AtomicBool,
}

impl Hub {
    fn sender(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }
}

/// Shared in-memory pub/sub hub.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    hub: Arc<Hub>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail (or succeed again).
    pub fn fail_publishes(&self, fail: bool) {
        self.hub.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// The last [`PUBLISHED_LOG_LIMIT`] payloads successfully published on
    /// `topic`, oldest first.
    pub fn published(&self, topic: &str) -> Vec<Vec<u8>> {
        self.hub
            .published
            .lock()
            .get(topic)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Deliver `payload` to subscribers of `topic` without any checks.
    pub(crate) fn deliver(&self, topic: &str, payload: Vec<u8>) {
        // No receivers is not an error on a broadcast medium
        let _ = self.hub.sender(topic).send(payload);
    }
}

impl Transport for MemoryTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> BeaconResult<()> {
        if self.hub.fail_publishes.load(Ordering::SeqCst) {
            return Err(BeaconError::Transport(format!(
                "Publish to {} rejected",
                topic
            )));
        }

        debug!(%topic, len = payload.len(), "Publishing");
        {
            let mut published = self.hub.published.lock();
            let log = published.entry(topic.to_string()).or_default();
            if log.len() == PUBLISHED_LOG_LIMIT {
                log.pop_front();
            }
            log.push_back(payload.clone());
        }
        self.deliver(topic, payload);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> BeaconResult<mpsc::Receiver<Vec<u8>>> {
        let mut source = self.hub.sender(topic).subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let topic = topic.to_string();

        tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(payload) => {
                        if tx.send(payload).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%topic, skipped, "Subscriber lagged, payloads dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(rx)
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("topics", &self.hub.topics.lock().len())
            .finish()
    }
}
