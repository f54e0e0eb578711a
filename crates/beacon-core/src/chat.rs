//! Encrypted chat over the shared chat topic
//!
//! The chat topic is a broadcast medium shared by every pair of peers, so the
//! receive path is a filter:
//!
//! 1. parse the payload as a [`ChatEnvelope`], else drop
//! 2. decrypt with the key derived from the envelope's own address fields, else drop
//! 3. keep it only if we are the recipient or the sender (our own echo)
//!
//! Nothing on the receive path surfaces an error. The send path surfaces
//! every failure as `BeaconError::Send`.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::config::OverlayConfig;
use crate::envelope::{ChatEnvelope, DecryptedMessage};
use crate::error::{BeaconError, BeaconResult};
use crate::identity::Address;
use crate::transport::{Subscription, Transport};

/// Run one received chat payload through the receive filter.
///
/// Returns the decrypted message if `me` is its recipient or sender.
pub fn accept_payload(payload: &[u8], me: &Address) -> Option<DecryptedMessage> {
    let envelope = match ChatEnvelope::from_bytes(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            trace!(error = %e, "Dropping unparseable chat payload");
            return None;
        }
    };

    // Cheap relevance check first; the outcome is the same either way
    if !envelope.involves(me) {
        trace!("Dropping chat envelope for another pair");
        return None;
    }

    match envelope.open() {
        Ok(message) => Some(message),
        Err(e) => {
            debug!(sender = %envelope.sender_address.short(), error = %e, "Dropping undecryptable chat envelope");
            None
        }
    }
}

/// Send and receive encrypted chat messages for one local address.
pub struct ChatChannel<T: Transport> {
    transport: Arc<T>,
    address: Address,
    topic: String,
    subscription: Mutex<Option<Subscription>>,
}

impl<T: Transport> ChatChannel<T> {
    pub fn new(transport: Arc<T>, address: Address, config: &OverlayConfig) -> Self {
        Self {
            transport,
            address,
            topic: config.chat_topic.clone(),
            subscription: Mutex::new(None),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Encrypt `plaintext` for `recipient` and publish it.
    ///
    /// Returns the envelope as published.
    ///
    /// # Errors
    ///
    /// Returns `BeaconError::Send` if the message is empty or whitespace,
    /// or if encryption or the publish fails.
    pub async fn send(&self, plaintext: &str, recipient: &Address) -> BeaconResult<ChatEnvelope> {
        if plaintext.trim().is_empty() {
            return Err(BeaconError::Send("message is empty".to_string()));
        }

        let envelope = ChatEnvelope::seal(plaintext, &self.address, recipient)
            .map_err(BeaconError::into_send)?;
        let bytes = envelope.to_bytes().map_err(BeaconError::into_send)?;

        self.transport
            .publish(&self.topic, bytes)
            .await
            .map_err(BeaconError::into_send)?;

        debug!(recipient = %recipient.short(), "Chat message sent");
        Ok(envelope)
    }

    /// Deliver every accepted incoming message to `on_message`.
    ///
    /// Replaces any previous listener.
    ///
    /// # Errors
    ///
    /// Returns `BeaconError::Transport` if the chat topic cannot be subscribed.
    pub async fn listen<F>(&self, on_message: F) -> BeaconResult<()>
    where
        F: Fn(DecryptedMessage) + Send + 'static,
    {
        let receiver = self.transport.subscribe(&self.topic).await?;
        let me = self.address.clone();
        let subscription = Subscription::spawn(self.topic.clone(), receiver, move |payload| {
            if let Some(message) = accept_payload(&payload, &me) {
                on_message(message);
            }
        });

        if let Some(previous) = self.subscription.lock().replace(subscription) {
            previous.unsubscribe();
        }
        info!(topic = %self.topic, "Listening for chat messages");
        Ok(())
    }

    pub fn is_listening(&self) -> bool {
        self.subscription
            .lock()
            .as_ref()
            .is_some_and(Subscription::is_active)
    }

    /// Stop delivering incoming messages. Idempotent.
    pub fn stop(&self) {
        if let Some(subscription) = self.subscription.lock().take() {
            subscription.unsubscribe();
        }
    }
}

impl<T: Transport> std::fmt::Debug for ChatChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatChannel")
            .field("address", &self.address)
            .field("topic", &self.topic)
            .finish()
    }
}
