//! Redis pub/sub transport (optional).
//!
//! Note: Redis pub/sub is not durable; messages published while a subscriber
//! is disconnected are lost. That matches the bridge's fire-and-forget
//! contract. Each `subscribe` runs its own blocking connection on a
//! background thread.

use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;

use redis::Commands;
use tracing::{debug, error, warn};

use super::{MessageHandler, QoS, Transport, TransportError};

/// Default Redis URL when `REDIS_URL` is not set.
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

/// Redis pub/sub transport for fragment messages.
pub struct RedisTransport {
    client: redis::Client,
    /// Lazily (re)opened connection used for publishing.
    publisher: Mutex<Option<redis::Connection>>,
}

impl core::fmt::Debug for RedisTransport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisTransport")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl RedisTransport {
    /// Open a client and verify the server is reachable.
    pub fn connect(redis_url: impl AsRef<str>) -> Result<Self, TransportError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        let conn = client
            .get_connection()
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            publisher: Mutex::new(Some(conn)),
        })
    }

    /// Connect using `REDIS_URL` (default `redis://localhost:6379`).
    pub fn from_env() -> Result<Self, TransportError> {
        let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string());
        Self::connect(redis_url)
    }
}

impl Transport for RedisTransport {
    fn publish(&self, topic: &str, payload: &[u8], _qos: QoS) -> Result<(), TransportError> {
        let publish_err = |reason: String| TransportError::Publish {
            topic: topic.to_string(),
            reason,
        };

        let mut slot = self
            .publisher
            .lock()
            .map_err(|_| publish_err("publisher lock poisoned".to_string()))?;

        if slot.is_none() {
            let conn = self
                .client
                .get_connection()
                .map_err(|e| TransportError::Connection(e.to_string()))?;
            *slot = Some(conn);
        }
        let Some(conn) = slot.as_mut() else {
            return Err(TransportError::Connection("no publisher connection".to_string()));
        };

        match conn.publish::<_, _, i64>(topic, payload) {
            Ok(receivers) => {
                debug!(topic, bytes = payload.len(), receivers, "published");
                Ok(())
            }
            Err(e) => {
                // Force a reconnect on the next publish.
                *slot = None;
                Err(publish_err(e.to_string()))
            }
        }
    }

    fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<(), TransportError> {
        let subscribe_err = |reason: String| TransportError::Subscribe {
            topic: topic.to_string(),
            reason,
        };

        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();
        let channel = topic.to_string();

        // Background thread that receives pub/sub messages and hands them over.
        thread::spawn(move || {
            let mut pubsub = conn.as_pubsub();
            if let Err(e) = pubsub.subscribe(&channel) {
                let _ = ready_tx.send(Err(e.to_string()));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            loop {
                let msg = match pubsub.get_message() {
                    Ok(m) => m,
                    Err(e) => {
                        error!(topic = %channel, error = %e, "redis subscription closed");
                        return;
                    }
                };

                handler(msg.get_channel_name(), msg.get_payload_bytes());
            }
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(subscribe_err(reason)),
            Err(_) => {
                warn!(topic, "redis subscriber thread exited before confirming");
                Err(subscribe_err("subscriber thread exited".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    #[ignore = "Requires Redis (REDIS_URL)"]
    fn publish_reaches_subscriber() {
        let transport = RedisTransport::from_env().unwrap();
        let topic = format!("/relaybus/test/{}/events", relaybus_core::MessageId::generate());

        let (tx, rx) = mpsc::channel::<(String, Vec<u8>)>();
        let tx = Mutex::new(tx);
        let handler: MessageHandler = Arc::new(move |topic: &str, payload: &[u8]| {
            let _ = tx.lock().unwrap().send((topic.to_string(), payload.to_vec()));
        });
        transport.subscribe(&topic, handler).unwrap();

        transport
            .publish(&topic, br#"{"id":"m","index":0,"count":1,"data":"{}"}"#, QoS::AtLeastOnce)
            .unwrap();

        let (received_topic, payload) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(received_topic, topic);
        assert_eq!(payload, br#"{"id":"m","index":0,"count":1,"data":"{}"}"#);
    }
}
