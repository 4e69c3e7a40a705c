//! Transport bridge: carries bus events over a size-limited pub/sub transport.
//!
//! ## Outbound
//!
//! `publish` wraps the event in an envelope stamped with the local bus origin,
//! splits it with the fragment codec and sends every fragment as its own
//! transport message. Nothing is awaited or retried.
//!
//! ## Inbound
//!
//! The bridge subscribes once, at construction, to `<prefix>/events`. Every
//! message is parsed as a fragment and fed to the reassembler. A completed
//! envelope is:
//!
//! - dropped when its origin is the local bus (our own echo; the event already
//!   took effect locally when it was published)
//! - re-published on the local bus otherwise
//!
//! Malformed input never escapes the handler; it is traced and discarded.
//!
//! The bridge does not forward local bus traffic on its own. Two processes
//! that each forwarded everything would bounce remote events back and forth
//! forever, since re-published events carry the re-publisher's origin.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, instrument, warn};

use relaybus_events::{Bus, BusError, CodecError, Event, EventPayload, Fragment, Reassembler, encode};

use crate::config::BridgeConfig;
use crate::transport::{MessageHandler, QoS, Transport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("transport unavailable: {0}")]
    TransportUnavailable(#[from] TransportError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// What the inbound path did with one transport message.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Fragment stored; its message still misses other fragments.
    Incomplete,
    /// Message complete but originated from this process.
    Suppressed,
    /// Message complete and fanned out on the local bus.
    Delivered,
    /// Message unusable (malformed, unknown type, or a subscriber failed).
    Dropped,
}

/// Inbound state shared with the transport callback.
struct Inbound {
    bus: Arc<Bus>,
    pending: Mutex<Reassembler>,
    reassembly_ttl: Option<Duration>,
}

impl Inbound {
    fn handle(&self, payload: &[u8]) -> InboundOutcome {
        let fragment = match Fragment::from_slice(payload) {
            Ok(f) => f,
            Err(e) => {
                debug!(error = %e, "discarding transport message");
                return InboundOutcome::Dropped;
            }
        };

        // Release the reassembly lock before dispatching to subscribers.
        let accepted = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(ttl) = self.reassembly_ttl {
                pending.evict_stale(ttl);
            }
            pending.accept(fragment)
        };

        let envelope = match accepted {
            Ok(Some(envelope)) => envelope,
            Ok(None) => return InboundOutcome::Incomplete,
            Err(e) => {
                debug!(error = %e, "discarding fragment");
                return InboundOutcome::Dropped;
            }
        };

        debug!(
            event_type = envelope.event_type(),
            source_id = %envelope.source_id(),
            "received event from transport"
        );

        if envelope.source_id() == self.bus.origin_id() {
            return InboundOutcome::Suppressed;
        }

        let (event_type, _, properties) = envelope.into_parts();
        match self.bus.publish_raw(&event_type, properties) {
            Ok(()) => InboundOutcome::Delivered,
            Err(e @ BusError::Subscriber { .. }) => {
                warn!(event_type = %event_type, error = %e, "subscriber failed on remote event");
                InboundOutcome::Dropped
            }
            Err(e) => {
                debug!(event_type = %event_type, error = %e, "discarding remote event");
                InboundOutcome::Dropped
            }
        }
    }
}

/// Binds a [`Bus`] to an external transport.
pub struct TransportBridge<T: Transport> {
    bus: Arc<Bus>,
    transport: Arc<T>,
    config: BridgeConfig,
    events_topic: String,
    inbound: Arc<Inbound>,
}

impl<T: Transport> core::fmt::Debug for TransportBridge<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TransportBridge")
            .field("origin_id", self.bus.origin_id())
            .field("events_topic", &self.events_topic)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> TransportBridge<T> {
    /// Subscribe to `<prefix>/events` and start relaying inbound events to `bus`.
    pub fn new(bus: Arc<Bus>, transport: Arc<T>, config: BridgeConfig) -> Result<Self, BridgeError> {
        let events_topic = config.events_topic();
        let inbound = Arc::new(Inbound {
            bus: bus.clone(),
            pending: Mutex::new(Reassembler::new()),
            reassembly_ttl: config.reassembly_ttl(),
        });

        let handler_state = inbound.clone();
        let handler: MessageHandler = Arc::new(move |_topic: &str, payload: &[u8]| {
            handler_state.handle(payload);
        });
        transport.subscribe(&events_topic, handler)?;

        debug!(topic = %events_topic, origin_id = %bus.origin_id(), "transport bridge subscribed");

        Ok(Self {
            bus,
            transport,
            config,
            events_topic,
            inbound,
        })
    }

    pub fn bus(&self) -> &Arc<Bus> {
        &self.bus
    }

    pub fn prefix(&self) -> &str {
        self.config.topic_prefix()
    }

    pub fn events_topic(&self) -> &str {
        &self.events_topic
    }

    /// Partial messages currently awaiting fragments.
    pub fn pending_messages(&self) -> usize {
        self.inbound
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending_messages()
    }

    /// Send `properties` as event `E` to `topic`.
    ///
    /// Returns the number of fragments handed to the transport; zero means
    /// nothing needed sending.
    #[instrument(skip(self, properties), fields(event_type = E::TYPE), err)]
    pub fn publish<E: Event>(&self, topic: &str, properties: E) -> Result<usize, BridgeError> {
        let envelope = EventPayload::typed(self.bus.origin_id().clone(), properties);
        let fragments = encode(&envelope, self.config.max_fragment_bytes())?;

        for fragment in &fragments {
            let message = fragment.to_json()?;
            self.transport
                .publish(topic, message.as_bytes(), QoS::AtLeastOnce)?;
        }

        Ok(fragments.len())
    }

    /// Send `properties` as event `E` to this bridge's events topic.
    pub fn publish_event<E: Event>(&self, properties: E) -> Result<usize, BridgeError> {
        self.publish(&self.events_topic, properties)
    }

    /// Run one raw transport message through the inbound path.
    ///
    /// The transport callback registered at construction calls the same code.
    pub fn handle_message(&self, payload: &[u8]) -> InboundOutcome {
        self.inbound.handle(payload)
    }
}
