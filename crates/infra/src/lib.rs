//! Infrastructure layer: transports, the transport bridge, configuration.

pub mod bridge;
pub mod config;
pub mod transport;


pub use bridge::{BridgeError, InboundOutcome, TransportBridge};
pub use config::{BridgeConfig, ConfigError};
pub use transport::{InMemoryTransport, MessageHandler, QoS, Transport, TransportError};
#[cfg(feature = "redis")]
pub use transport::RedisTransport;
