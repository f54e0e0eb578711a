//! Announce/heartbeat/response exchange on the discovery topic
//!
//! ```text
//!   Idle ──start()──► Announcing ──announce + heartbeat──► SteadyState ──cleanup()──► Stopped
//!                                                          │
//!                                     every interval: prune + heartbeat
//! ```
//!
//! Every received signal from another address refreshes that peer in the
//! [`PresenceTracker`]. An `announce` additionally triggers exactly one
//! `response`, so a newly joined peer learns about us without waiting for
//! the next heartbeat.
//!
//! Publish failures are logged and swallowed. A lost heartbeat costs at most
//! one interval of liveness; it must never stop the timer.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::clock::Clock;
use crate::config::OverlayConfig;
use crate::envelope::{DiscoverySignal, SignalKind};
use crate::error::BeaconResult;
use crate::identity::Address;
use crate::presence::PresenceTracker;
use crate::transport::{Subscription, Transport};

/// Lifecycle of a [`DiscoveryEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    Idle,
    /// Startup signals are being published
    Announcing,
    /// Heartbeat timer running
    SteadyState,
    Stopped,
}

impl fmt::Display for DiscoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryState::Idle => write!(f, "idle"),
            DiscoveryState::Announcing => write!(f, "announcing"),
            DiscoveryState::SteadyState => write!(f, "steady"),
            DiscoveryState::Stopped => write!(f, "stopped"),
        }
    }
}

struct Shared<T> {
    transport: Arc<T>,
    address: Address,
    topic: String,
    tracker: Arc<PresenceTracker>,
    clock: Arc<dyn Clock>,
    /// Set while a timer-driven heartbeat publish is outstanding
    heartbeat_in_flight: AtomicBool,
}

impl<T: Transport> Shared<T> {
    /// Publish one signal. Failures are logged, never returned.
    async fn publish(&self, kind: SignalKind) -> bool {
        let signal = DiscoverySignal::new(kind, self.address.clone(), self.clock.now_ms());
        let result = match signal.to_bytes() {
            Ok(bytes) => self.transport.publish(&self.topic, bytes).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                trace!(%kind, "Published discovery signal");
                true
            }
            Err(e) => {
                warn!(%kind, error = %e, "Failed to publish discovery signal");
                false
            }
        }
    }

    fn handle_payload(self: &Arc<Self>, payload: &[u8]) {
        let signal = match DiscoverySignal::from_bytes(payload) {
            Ok(signal) => signal,
            Err(e) => {
                trace!(error = %e, "Dropping malformed discovery payload");
                return;
            }
        };

        if signal.address == self.address {
            return;
        }

        debug!(kind = %signal.kind, peer = %signal.address.short(), "Discovery signal");
        self.tracker
            .record_signal(&signal.address, self.clock.now_ms());

        if signal.kind == SignalKind::Announce {
            let shared = self.clone();
            tokio::spawn(async move {
                shared.publish(SignalKind::Response).await;
            });
        }
    }

    /// One timer firing: prune, then heartbeat unless the last one is still pending.
    fn tick(self: &Arc<Self>) {
        self.tracker.live_count();

        if self.heartbeat_in_flight.swap(true, Ordering::SeqCst) {
            debug!("Previous heartbeat still in flight, skipping tick");
            return;
        }

        let shared = self.clone();
        tokio::spawn(async move {
            shared.publish(SignalKind::Heartbeat).await;
            shared.heartbeat_in_flight.store(false, Ordering::SeqCst);
        });
    }
}

/// Drives presence discovery for one local identity.
pub struct DiscoveryEngine<T: Transport> {
    shared: Arc<Shared<T>>,
    interval: Duration,
    state: Mutex<DiscoveryState>,
    timer: Mutex<Option<JoinHandle<()>>>,
    subscription: Mutex<Option<Subscription>>,
}

impl<T: Transport> DiscoveryEngine<T> {
    pub fn new(
        transport: Arc<T>,
        address: Address,
        config: &OverlayConfig,
        tracker: Arc<PresenceTracker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                address,
                topic: config.discovery_topic.clone(),
                tracker,
                clock,
                heartbeat_in_flight: AtomicBool::new(false),
            }),
            interval: config.heartbeat_interval,
            state: Mutex::new(DiscoveryState::Idle),
            timer: Mutex::new(None),
            subscription: Mutex::new(None),
        }
    }

    pub fn state(&self) -> DiscoveryState {
        *self.state.lock()
    }

    pub fn tracker(&self) -> &Arc<PresenceTracker> {
        &self.shared.tracker
    }

    /// Subscribe to the discovery topic, publish `announce` then `heartbeat`,
    /// and start the heartbeat timer.
    ///
    /// Calling `start` on an engine that is not idle does nothing.
    ///
    /// # Errors
    ///
    /// Returns `BeaconError::Transport` if the subscription cannot be
    /// established. Publish failures are not errors.
    pub async fn start(&self) -> BeaconResult<()> {
        {
            let mut state = self.state.lock();
            if *state != DiscoveryState::Idle {
                debug!(state = %*state, "Discovery already started");
                return Ok(());
            }
            *state = DiscoveryState::Announcing;
        }

        info!(address = %self.shared.address.short(), topic = %self.shared.topic, "Starting discovery");

        let receiver = match self.shared.transport.subscribe(&self.shared.topic).await {
            Ok(receiver) => receiver,
            Err(e) => {
                let mut state = self.state.lock();
                if *state == DiscoveryState::Announcing {
                    *state = DiscoveryState::Idle;
                }
                return Err(e);
            }
        };
        let shared = self.shared.clone();
        let subscription = Subscription::spawn(self.shared.topic.clone(), receiver, move |payload| {
            shared.handle_payload(&payload)
        });

        // Stored under the state lock so cleanup() either sees it or has
        // already marked the engine stopped
        let orphan = {
            let state = self.state.lock();
            if *state == DiscoveryState::Announcing {
                *self.subscription.lock() = Some(subscription);
                None
            } else {
                Some(subscription)
            }
        };
        if let Some(subscription) = orphan {
            debug!("Discovery stopped while subscribing");
            subscription.unsubscribe();
            return Ok(());
        }

        self.shared.publish(SignalKind::Announce).await;
        self.shared.publish(SignalKind::Heartbeat).await;

        let mut state = self.state.lock();
        if *state != DiscoveryState::Announcing {
            // cleanup() ran while the startup signals were in flight
            return Ok(());
        }
        *state = DiscoveryState::SteadyState;
        *self.timer.lock() = Some(self.spawn_timer());
        Ok(())
    }

    fn spawn_timer(&self) -> JoinHandle<()> {
        let shared = self.shared.clone();
        let period = self.interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                shared.tick();
            }
        })
    }

    /// Stop the heartbeat timer and request unsubscription.
    ///
    /// In-flight publishes are left to complete. Safe to call any number of
    /// times, or never.
    pub fn cleanup(&self) {
        {
            let mut state = self.state.lock();
            if *state != DiscoveryState::Stopped {
                info!(address = %self.shared.address.short(), "Discovery stopped");
                *state = DiscoveryState::Stopped;
            }
        }

        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
        }
        if let Some(subscription) = self.subscription.lock().take() {
            subscription.unsubscribe();
        }
    }
}

impl<T: Transport> Drop for DiscoveryEngine<T> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.abort();
        }
        if let Some(subscription) = self.subscription.get_mut().take() {
            subscription.unsubscribe();
        }
    }
}

impl<T: Transport> fmt::Debug for DiscoveryEngine<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryEngine")
            .field("address", &self.shared.address)
            .field("topic", &self.shared.topic)
            .field("state", &self.state())
            .finish()
    }
}
