//! `relaybus-core` — identifiers shared by the bus, the fragment codec and the
//! transport bridge.
//!
//! This crate contains no IO and no event mechanics.

pub mod error;
pub mod id;

pub use error::{IdError, IdResult};
pub use id::{MessageId, OriginId};
