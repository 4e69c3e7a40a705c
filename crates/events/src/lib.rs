//! Event mechanics: the in-process bus and the fragment codec.
//!
//! Nothing in this crate performs IO. Carrying events between processes is
//! the job of the transport bridge in `relaybus-infra`.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod fragment;
pub mod reassembly;

pub use bus::{Bus, BusError, HandlerResult, SubscriptionHandle};
pub use envelope::{EventPayload, RawEventPayload};
pub use event::Event;
pub use fragment::{CodecError, DEFAULT_MAX_SEGMENT_BYTES, Fragment, encode, split_segments};
pub use reassembly::Reassembler;
