//! Live-peer tracking
//!
//! The tracker folds discovery signals into a map of address → last time a
//! signal from that address was received. Staleness is evaluated lazily: every
//! count query (and every recorded signal) prunes entries older than the peer
//! timeout, so the map may briefly hold dead peers but never reports them.
//!
//! ```text
//!   signal(B) ──► record_signal ──┐
//!                                 ├──► prune stale ──► count changed? ──► observer(count)
//!   UI / timer ─► live_count ─────┘
//! ```
//!
//! Presence is an estimate. Heartbeats are lossy so a live peer may briefly
//! drop out, but a silent peer never outlives the timeout by more than the
//! time until the next query.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::clock::Clock;
use crate::identity::Address;

/// Callback invoked with the new live-peer count.
pub type CountObserver = Arc<dyn Fn(usize) + Send + Sync>;

/// A remote peer currently considered live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub address: Address,
    /// Local receive time of the latest signal, Unix milliseconds
    pub last_seen_at: i64,
}

struct PresenceState {
    peers: HashMap<Address, i64>,
    /// Count last handed to the observer
    reported: usize,
}

/// Set of live remote peers for one local identity.
pub struct PresenceTracker {
    local: Address,
    timeout_ms: i64,
    clock: Arc<dyn Clock>,
    state: Mutex<PresenceState>,
    observer: RwLock<Option<CountObserver>>,
}

impl PresenceTracker {
    /// Create a tracker that ignores signals from `local`.
    pub fn new(local: Address, timeout_ms: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            local,
            timeout_ms,
            clock,
            state: Mutex::new(PresenceState {
                peers: HashMap::new(),
                reported: 0,
            }),
            observer: RwLock::new(None),
        }
    }

    /// Register the count observer, replacing any previous one.
    pub fn on_count_changed(&self, observer: impl Fn(usize) + Send + Sync + 'static) {
        *self.observer.write() = Some(Arc::new(observer));
    }

    /// Record a signal from `address` received at `seen_at` (Unix millis).
    ///
    /// Returns `false` without recording if `address` is the local identity.
    /// An older `seen_at` never moves a peer's last-seen time backwards.
    pub fn record_signal(&self, address: &Address, seen_at: i64) -> bool {
        if address == &self.local {
            trace!("Ignoring own discovery signal");
            return false;
        }

        let changed = {
            let mut state = self.state.lock();
            let entry = state.peers.entry(address.clone()).or_insert(seen_at);
            if *entry < seen_at {
                *entry = seen_at;
            }
            self.prune_locked(&mut state)
        };

        if let Some(count) = changed {
            self.notify(count);
        }
        true
    }

    /// Number of live peers, pruning stale ones.
    pub fn live_count(&self) -> usize {
        let (count, changed) = {
            let mut state = self.state.lock();
            let changed = self.prune_locked(&mut state);
            (state.peers.len(), changed)
        };

        if let Some(count) = changed {
            self.notify(count);
        }
        count
    }

    /// Live peers sorted by address, pruning stale ones.
    pub fn live_peers(&self) -> Vec<PeerRecord> {
        let (mut peers, changed) = {
            let mut state = self.state.lock();
            let changed = self.prune_locked(&mut state);
            let peers: Vec<PeerRecord> = state
                .peers
                .iter()
                .map(|(address, last_seen_at)| PeerRecord {
                    address: address.clone(),
                    last_seen_at: *last_seen_at,
                })
                .collect();
            (peers, changed)
        };

        if let Some(count) = changed {
            self.notify(count);
        }
        peers.sort_by(|a, b| a.address.cmp(&b.address));
        peers
    }

    /// Whether `address` is currently live. Does not prune.
    pub fn is_live(&self, address: &Address) -> bool {
        let now = self.clock.now_ms();
        self.state
            .lock()
            .peers
            .get(address)
            .is_some_and(|seen| now - *seen <= self.timeout_ms)
    }

    /// Drop stale entries. Returns the new count if it differs from the last
    /// one reported.
    fn prune_locked(&self, state: &mut PresenceState) -> Option<usize> {
        let now = self.clock.now_ms();
        let timeout = self.timeout_ms;
        state.peers.retain(|address, seen| {
            let live = now - *seen <= timeout;
            if !live {
                debug!(peer = %address.short(), idle_ms = now - *seen, "Peer timed out");
            }
            live
        });

        let count = state.peers.len();
        if count != state.reported {
            state.reported = count;
            Some(count)
        } else {
            None
        }
    }

    fn notify(&self, count: usize) {
        debug!(count, "Live peer count changed");
        let observer = self.observer.read().clone();
        if let Some(observer) = observer {
            observer(count);
        }
    }
}
