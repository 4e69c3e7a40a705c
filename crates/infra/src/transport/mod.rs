//! External publish/subscribe transports.
//!
//! The bridge only needs two primitives from a transport: publish a payload
//! to a topic, and register a callback for messages arriving on a topic.
//! Connecting (endpoint, credentials) is each implementation's constructor.
//!
//! Delivery guarantees are whatever the underlying system provides. Fragments
//! may be dropped, duplicated or reordered; the bridge copes with the last two.

use std::sync::Arc;

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis_pubsub;

pub use in_memory::InMemoryTransport;
#[cfg(feature = "redis")]
pub use redis_pubsub::RedisTransport;

/// Callback invoked for every inbound message: `(topic, payload)`.
pub type MessageHandler = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Requested delivery level. Transports without the notion ignore it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum QoS {
    AtMostOnce,
    #[default]
    AtLeastOnce,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport connection error: {0}")]
    Connection(String),

    #[error("publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("subscribe to '{topic}' failed: {reason}")]
    Subscribe { topic: String, reason: String },
}

/// Minimal pub/sub transport contract.
///
/// `publish` is fire-and-forget from the caller's point of view: success means
/// the transport accepted the message, not that anyone received it.
pub trait Transport: Send + Sync {
    fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), TransportError>;

    fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<(), TransportError>;
}

impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), TransportError> {
        (**self).publish(topic, payload, qos)
    }

    fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<(), TransportError> {
        (**self).subscribe(topic, handler)
    }
}
