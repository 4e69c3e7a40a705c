//! In-memory loopback transport for tests/dev.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{MessageHandler, QoS, Transport, TransportError};

/// A message accepted by [`InMemoryTransport::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

/// Loopback broker.
///
/// - No IO / no threads
/// - Every publish is delivered synchronously to each handler subscribed to
///   the exact topic, including handlers registered by the publisher itself
/// - Can be taken offline to simulate an unreachable broker
#[derive(Default)]
pub struct InMemoryTransport {
    handlers: Mutex<HashMap<String, Vec<MessageHandler>>>,
    published: Mutex<Vec<PublishedMessage>>,
    offline: AtomicBool,
}

impl core::fmt::Debug for InMemoryTransport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryTransport")
            .field("offline", &self.offline.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent publish/subscribe calls fail (or succeed again).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Every message accepted so far, in publish order.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    fn unavailable(&self) -> Option<TransportError> {
        self.offline
            .load(Ordering::SeqCst)
            .then(|| TransportError::Connection("in-memory transport is offline".to_string()))
    }
}

impl Transport for InMemoryTransport {
    fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), TransportError> {
        if let Some(err) = self.unavailable() {
            return Err(err);
        }

        if let Ok(mut published) = self.published.lock() {
            published.push(PublishedMessage {
                topic: topic.to_string(),
                payload: payload.to_vec(),
                qos,
            });
        }

        // Deliver outside the lock; handlers may publish again.
        let targets = self
            .handlers
            .lock()
            .map_err(|_| TransportError::Publish {
                topic: topic.to_string(),
                reason: "handler registry poisoned".to_string(),
            })?
            .get(topic)
            .cloned()
            .unwrap_or_default();

        for handler in targets {
            handler(topic, payload);
        }

        Ok(())
    }

    fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<(), TransportError> {
        if let Some(err) = self.unavailable() {
            return Err(err);
        }

        self.handlers
            .lock()
            .map_err(|_| TransportError::Subscribe {
                topic: topic.to_string(),
                reason: "handler registry poisoned".to_string(),
            })?
            .entry(topic.to_string())
            .or_default()
            .push(handler);

        Ok(())
    }
}
