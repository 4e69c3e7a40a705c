use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use relaybus_core::OriginId;

use crate::Event;

/// The record exchanged between processes.
///
/// Serialized flat as `{"type": ..., "sourceID": ..., "properties": ...}`.
/// Field order and names are part of the wire contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload<P> {
    #[serde(rename = "type")]
    event_type: String,

    #[serde(rename = "sourceID")]
    source_id: OriginId,

    properties: P,
}

/// Untyped envelope, as reassembled from the transport.
pub type RawEventPayload = EventPayload<JsonValue>;

impl<P> EventPayload<P> {
    pub fn new(event_type: impl Into<String>, source_id: OriginId, properties: P) -> Self {
        Self {
            event_type: event_type.into(),
            source_id,
            properties,
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn source_id(&self) -> &OriginId {
        &self.source_id
    }

    pub fn properties(&self) -> &P {
        &self.properties
    }

    pub fn into_properties(self) -> P {
        self.properties
    }

    pub fn into_parts(self) -> (String, OriginId, P) {
        (self.event_type, self.source_id, self.properties)
    }
}

impl<E: Event> EventPayload<E> {
    /// Build a typed envelope; the tag is taken from `E::TYPE`.
    pub fn typed(source_id: OriginId, properties: E) -> Self {
        Self::new(E::TYPE, source_id, properties)
    }
}
