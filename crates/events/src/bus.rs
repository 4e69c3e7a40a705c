//! In-process typed publish/subscribe hub.
//!
//! The [`Bus`] fans a published event out to every callback subscribed to that
//! event type, synchronously, in registration order. Each bus owns a random
//! [`OriginId`] which it stamps on every envelope it builds; the transport
//! bridge uses it to recognise echoes of its own messages.
//!
//! ## Dispatch semantics
//!
//! - **Synchronous**: `publish` returns only after every matching callback ran.
//! - **Fail loud**: the first callback error stops the fan-out and is returned
//!   to the caller of `publish`. Panics are not caught either.
//! - **Snapshot**: the subscriber list is copied before dispatch and no lock is
//!   held while callbacks run. A callback may publish or (un)subscribe; a
//!   subscriber added during a dispatch is first called by the *next* publish,
//!   and a subscriber removed during a dispatch is still called by the current
//!   one.
//!
//! ## Thread safety
//!
//! `Bus` is `Send + Sync`. Transports usually deliver inbound messages on their
//! own thread, so the subscription map sits behind a `RwLock`.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value as JsonValue;
use tracing::{Level, debug, trace};

use relaybus_core::OriginId;

use crate::{Event, EventPayload};

/// Error returned by subscriber callbacks.
pub type HandlerResult = anyhow::Result<()>;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Untyped publish for a tag nobody registered in this process.
    #[error("unregistered event type: {0}")]
    UnregisteredEventType(String),

    /// Two distinct Rust types claimed the same wire tag.
    #[error("event type '{0}' is already registered with a different payload type")]
    ConflictingEventType(&'static str),

    /// Untyped properties did not match the registered payload shape.
    #[error("invalid properties for '{event_type}': {source}")]
    InvalidProperties {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    /// A subscriber callback returned an error; dispatch was aborted.
    #[error("subscriber for '{event_type}' failed: {source}")]
    Subscriber {
        event_type: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// A thread panicked while holding the subscription lock.
    #[error("subscription registry lock poisoned")]
    Poisoned,
}

/// Opaque handle returned by [`Bus::subscribe`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    event_type: &'static str,
    id: u64,
}

impl SubscriptionHandle {
    pub fn event_type(&self) -> &'static str {
        self.event_type
    }
}

type TypedCallback<E> = Box<dyn Fn(&EventPayload<E>) -> HandlerResult + Send + Sync>;

/// Decodes untyped properties into `E` and publishes them.
type Decoder = fn(&Bus, JsonValue) -> Result<(), BusError>;

struct Slot {
    id: u64,
    /// Always a `TypedCallback<E>` for the `E` recorded in the owning entry.
    callback: Arc<dyn Any + Send + Sync>,
}

struct Registration {
    type_id: TypeId,
    decode: Decoder,
    slots: Vec<Slot>,
}

impl Registration {
    fn of<E: Event>() -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            decode: decode_and_publish::<E>,
            slots: Vec::new(),
        }
    }
}

fn decode_and_publish<E: Event>(bus: &Bus, properties: JsonValue) -> Result<(), BusError> {
    let properties: E =
        serde_json::from_value(properties).map_err(|source| BusError::InvalidProperties {
            event_type: E::TYPE.to_string(),
            source,
        })?;
    bus.publish(properties)
}

/// Subscription ids are unique across every bus in the process, so a handle
/// can only ever match the subscription it was issued for.
static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Typed, synchronous, in-process event hub.
pub struct Bus {
    origin_id: OriginId,
    registrations: RwLock<HashMap<&'static str, Registration>>,
}

impl core::fmt::Debug for Bus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Bus")
            .field("origin_id", &self.origin_id)
            .finish_non_exhaustive()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::with_origin(OriginId::generate())
    }
}

impl Bus {
    /// Create a bus with a freshly generated origin identifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bus with a caller-chosen origin (tests, replay tooling).
    pub fn with_origin(origin_id: OriginId) -> Self {
        Self {
            origin_id,
            registrations: RwLock::new(HashMap::new()),
        }
    }

    pub fn origin_id(&self) -> &OriginId {
        &self.origin_id
    }

    /// Make `E` known to untyped publishes (see [`Bus::publish_raw`]).
    ///
    /// Idempotent. `subscribe::<E>` registers implicitly.
    pub fn register<E: Event>(&self) -> Result<(), BusError> {
        let mut regs = self.registrations.write().map_err(|_| BusError::Poisoned)?;
        Self::registration_mut::<E>(&mut regs)?;
        Ok(())
    }

    fn registration_mut<'a, E: Event>(
        regs: &'a mut HashMap<&'static str, Registration>,
    ) -> Result<&'a mut Registration, BusError> {
        let reg = regs.entry(E::TYPE).or_insert_with(Registration::of::<E>);
        if reg.type_id != TypeId::of::<E>() {
            return Err(BusError::ConflictingEventType(E::TYPE));
        }
        Ok(reg)
    }

    /// Register `callback` for events of type `E`.
    pub fn subscribe<E, F>(&self, callback: F) -> Result<SubscriptionHandle, BusError>
    where
        E: Event,
        F: Fn(&EventPayload<E>) -> HandlerResult + Send + Sync + 'static,
    {
        let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
        let callback: TypedCallback<E> = Box::new(callback);

        let mut regs = self.registrations.write().map_err(|_| BusError::Poisoned)?;
        Self::registration_mut::<E>(&mut regs)?.slots.push(Slot {
            id,
            callback: Arc::new(callback),
        });

        trace!(event_type = E::TYPE, subscription_id = id, "subscribed");
        Ok(SubscriptionHandle {
            event_type: E::TYPE,
            id,
        })
    }

    /// Remove a subscription. Unknown or already-removed handles are ignored.
    ///
    /// Returns whether a subscription was actually removed.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let Ok(mut regs) = self.registrations.write() else {
            return false;
        };
        let Some(reg) = regs.get_mut(handle.event_type) else {
            return false;
        };

        let before = reg.slots.len();
        reg.slots.retain(|slot| slot.id != handle.id);
        before != reg.slots.len()
    }

    /// Number of live subscriptions for a wire tag.
    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.registrations
            .read()
            .ok()
            .and_then(|regs| regs.get(event_type).map(|reg| reg.slots.len()))
            .unwrap_or(0)
    }

    /// Publish `properties` to every subscriber of `E`, stamped with this bus's origin.
    pub fn publish<E: Event>(&self, properties: E) -> Result<(), BusError> {
        let envelope = EventPayload::typed(self.origin_id.clone(), properties);

        if tracing::enabled!(Level::DEBUG) {
            if let Ok(json) = serde_json::to_string(&envelope) {
                debug!(envelope = %json, "publishing event");
            }
        }

        for callback in self.snapshot::<E>()? {
            callback(&envelope).map_err(|source| BusError::Subscriber {
                event_type: E::TYPE,
                source,
            })?;
        }

        Ok(())
    }

    /// Publish from an untyped tag + JSON properties.
    ///
    /// Used by the inbound transport path, where the tag is only known at
    /// runtime. Fails fast when the tag is not registered in this process.
    pub fn publish_raw(&self, event_type: &str, properties: JsonValue) -> Result<(), BusError> {
        let decode = {
            let regs = self.registrations.read().map_err(|_| BusError::Poisoned)?;
            regs.get(event_type)
                .map(|reg| reg.decode)
                .ok_or_else(|| BusError::UnregisteredEventType(event_type.to_string()))?
        };
        decode(self, properties)
    }

    fn snapshot<E: Event>(&self) -> Result<Vec<Arc<TypedCallback<E>>>, BusError> {
        let regs = self.registrations.read().map_err(|_| BusError::Poisoned)?;
        let Some(reg) = regs.get(E::TYPE) else {
            return Ok(Vec::new());
        };
        if reg.type_id != TypeId::of::<E>() {
            return Err(BusError::ConflictingEventType(E::TYPE));
        }

        // The type_id check above guarantees every slot downcasts.
        Ok(reg
            .slots
            .iter()
            .filter_map(|slot| slot.callback.clone().downcast::<TypedCallback<E>>().ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Foo {
        n: i64,
    }

    impl Event for Foo {
        const TYPE: &'static str = "foo";
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Bar {
        label: String,
    }

    impl Event for Bar {
        const TYPE: &'static str = "bar";
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct FakeFoo {
        other: bool,
    }

    impl Event for FakeFoo {
        const TYPE: &'static str = "foo";
    }

    fn recorder<E: Event>(bus: &Bus) -> (SubscriptionHandle, Arc<Mutex<Vec<EventPayload<E>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handle = bus
            .subscribe::<E, _>(move |env| {
                sink.lock().unwrap().push(env.clone());
                Ok(())
            })
            .unwrap();
        (handle, seen)
    }

    #[test]
    fn only_matching_type_is_dispatched() {
        let bus = Bus::new();
        let (_h, seen) = recorder::<Foo>(&bus);

        bus.publish(Bar { label: "x".into() }).unwrap();
        assert!(seen.lock().unwrap().is_empty());

        bus.publish(Foo { n: 7 }).unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].properties(), &Foo { n: 7 });
        assert_eq!(seen[0].source_id(), bus.origin_id());
        assert_eq!(seen[0].event_type(), "foo");
    }

    #[test]
    fn subscribers_run_in_registration_order() {
        let bus = Bus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            bus.subscribe::<Foo, _>(move |_| {
                order.lock().unwrap().push(i);
                Ok(())
            })
            .unwrap();
        }

        bus.publish(Foo { n: 0 }).unwrap();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = Bus::new();
        let (handle, seen) = recorder::<Foo>(&bus);
        let (_keep, other) = recorder::<Foo>(&bus);

        assert!(bus.unsubscribe(&handle));
        bus.publish(Foo { n: 1 }).unwrap();

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(other.lock().unwrap().len(), 1);
    }

    #[test]
    fn unsubscribe_unknown_handle_is_a_noop() {
        let bus = Bus::new();
        let (handle, _seen) = recorder::<Foo>(&bus);
        let (_keep, other) = recorder::<Foo>(&bus);

        assert!(bus.unsubscribe(&handle));
        assert!(!bus.unsubscribe(&handle));

        let foreign = Bus::new();
        let (stray, _) = recorder::<Bar>(&foreign);
        assert!(!bus.unsubscribe(&stray));

        // Same tag on another bus must not reach into this one.
        let (lookalike, _) = recorder::<Foo>(&foreign);
        assert!(!bus.unsubscribe(&lookalike));
        assert_eq!(foreign.subscriber_count("foo"), 1);

        bus.publish(Foo { n: 2 }).unwrap();
        assert_eq!(other.lock().unwrap().len(), 1);
        assert_eq!(bus.subscriber_count("foo"), 1);
    }

    #[test]
    fn unsubscribing_the_first_subscriber_works() {
        let bus = Bus::new();
        let (first, seen) = recorder::<Foo>(&bus);

        assert!(bus.unsubscribe(&first));
        bus.publish(Foo { n: 3 }).unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn subscriber_error_surfaces_and_stops_fan_out() {
        let bus = Bus::new();
        bus.subscribe::<Foo, _>(|_| Err(anyhow::anyhow!("boom"))).unwrap();
        let (_h, seen) = recorder::<Foo>(&bus);

        let err = bus.publish(Foo { n: 1 }).unwrap_err();
        match err {
            BusError::Subscriber { event_type, source } => {
                assert_eq!(event_type, "foo");
                assert_eq!(source.to_string(), "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn subscriber_added_during_dispatch_waits_for_next_publish() {
        let bus = Arc::new(Bus::new());
        let late_calls = Arc::new(Mutex::new(0));

        let inner_bus = bus.clone();
        let counter = late_calls.clone();
        let added = Arc::new(Mutex::new(false));
        bus.subscribe::<Foo, _>(move |_| {
            let mut added = added.lock().unwrap();
            if !*added {
                *added = true;
                let counter = counter.clone();
                inner_bus.subscribe::<Foo, _>(move |_| {
                    *counter.lock().unwrap() += 1;
                    Ok(())
                })?;
            }
            Ok(())
        })
        .unwrap();

        bus.publish(Foo { n: 1 }).unwrap();
        assert_eq!(*late_calls.lock().unwrap(), 0);

        bus.publish(Foo { n: 2 }).unwrap();
        assert_eq!(*late_calls.lock().unwrap(), 1);
    }

    #[test]
    fn subscriber_removed_during_dispatch_still_runs_once() {
        let bus = Arc::new(Bus::new());
        let victim: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));

        let inner_bus = bus.clone();
        let target = victim.clone();
        bus.subscribe::<Foo, _>(move |_| {
            if let Some(handle) = target.lock().unwrap().take() {
                inner_bus.unsubscribe(&handle);
            }
            Ok(())
        })
        .unwrap();
        let (handle, seen) = recorder::<Foo>(&bus);
        *victim.lock().unwrap() = Some(handle);

        bus.publish(Foo { n: 1 }).unwrap();
        bus.publish(Foo { n: 2 }).unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn publish_raw_decodes_registered_types() {
        let bus = Bus::new();
        let (_h, seen) = recorder::<Foo>(&bus);

        bus.publish_raw("foo", serde_json::json!({"n": 41})).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].properties(), &Foo { n: 41 });
        assert_eq!(seen[0].source_id(), bus.origin_id());
    }

    #[test]
    fn publish_raw_rejects_unknown_tags() {
        let bus = Bus::new();
        let err = bus.publish_raw("nope", serde_json::json!({})).unwrap_err();
        assert!(matches!(err, BusError::UnregisteredEventType(t) if t == "nope"));
    }

    #[test]
    fn publish_raw_rejects_mismatched_properties() {
        let bus = Bus::new();
        bus.register::<Foo>().unwrap();
        let err = bus.publish_raw("foo", serde_json::json!({"n": "text"})).unwrap_err();
        assert!(matches!(err, BusError::InvalidProperties { .. }));
    }

    #[test]
    fn conflicting_payload_types_for_one_tag_are_refused() {
        let bus = Bus::new();
        bus.register::<Foo>().unwrap();

        assert!(matches!(
            bus.register::<FakeFoo>(),
            Err(BusError::ConflictingEventType("foo"))
        ));
        assert!(matches!(
            bus.publish(FakeFoo { other: true }),
            Err(BusError::ConflictingEventType("foo"))
        ));
    }

    #[test]
    fn publish_without_subscribers_is_ok() {
        let bus = Bus::new();
        bus.publish(Bar { label: "quiet".into() }).unwrap();
        assert_eq!(bus.subscriber_count("bar"), 0);
    }

    #[test]
    fn each_bus_gets_its_own_origin() {
        assert_ne!(Bus::new().origin_id(), Bus::new().origin_id());
    }
}
