//! Bridge configuration.
//!
//! Everything is supplied by the caller; `from_env` is a convenience for
//! processes configured through the environment:
//!
//! - `RELAYBUS_TOPIC_PREFIX`: full topic prefix, e.g. `/relaybus/shop/dev`
//! - `RELAYBUS_APP` + `RELAYBUS_STAGE`: used when no explicit prefix is set
//! - `RELAYBUS_MAX_FRAGMENT_BYTES`: fragment `data` limit (default 100000)
//! - `RELAYBUS_REASSEMBLY_TTL_SECS`: evict partial messages older than this

use std::time::Duration;

use tracing::warn;

use relaybus_events::DEFAULT_MAX_SEGMENT_BYTES;

/// Leading path segment of prefixes built by [`BridgeConfig::for_deployment`].
pub const TOPIC_NAMESPACE: &str = "relaybus";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no topic prefix: set RELAYBUS_TOPIC_PREFIX or both RELAYBUS_APP and RELAYBUS_STAGE")]
    MissingTopicPrefix,

    #[error("topic prefix must not be empty")]
    EmptyTopicPrefix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    topic_prefix: String,
    max_fragment_bytes: usize,
    reassembly_ttl: Option<Duration>,
}

impl BridgeConfig {
    pub fn new(topic_prefix: impl Into<String>) -> Result<Self, ConfigError> {
        let topic_prefix = topic_prefix.into();
        let topic_prefix = topic_prefix.trim_end_matches('/');
        if topic_prefix.is_empty() {
            return Err(ConfigError::EmptyTopicPrefix);
        }

        Ok(Self {
            topic_prefix: topic_prefix.to_string(),
            max_fragment_bytes: DEFAULT_MAX_SEGMENT_BYTES,
            reassembly_ttl: None,
        })
    }

    /// Prefix derived from deployment naming: `/relaybus/<app>/<stage>`.
    pub fn for_deployment(app: &str, stage: &str) -> Result<Self, ConfigError> {
        if app.is_empty() || stage.is_empty() {
            return Err(ConfigError::MissingTopicPrefix);
        }
        Self::new(format!("/{TOPIC_NAMESPACE}/{app}/{stage}"))
    }

    /// Limit on each fragment's `data`. Zero is ignored with a warning.
    pub fn with_max_fragment_bytes(mut self, bytes: usize) -> Self {
        if bytes == 0 {
            warn!("max fragment size of 0 ignored; keeping {}", self.max_fragment_bytes);
        } else {
            self.max_fragment_bytes = bytes;
        }
        self
    }

    pub fn with_reassembly_ttl(mut self, ttl: Duration) -> Self {
        self.reassembly_ttl = Some(ttl);
        self
    }

    pub fn topic_prefix(&self) -> &str {
        &self.topic_prefix
    }

    pub fn events_topic(&self) -> String {
        format!("{}/events", self.topic_prefix)
    }

    pub fn max_fragment_bytes(&self) -> usize {
        self.max_fragment_bytes
    }

    pub fn reassembly_ttl(&self) -> Option<Duration> {
        self.reassembly_ttl
    }

    /// Load from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (same keys as [`BridgeConfig::from_env`]).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup("RELAYBUS_TOPIC_PREFIX") {
            Some(prefix) => Self::new(prefix)?,
            None => {
                let app = lookup("RELAYBUS_APP").ok_or(ConfigError::MissingTopicPrefix)?;
                let stage = lookup("RELAYBUS_STAGE").ok_or(ConfigError::MissingTopicPrefix)?;
                Self::for_deployment(&app, &stage)?
            }
        };

        if let Some(raw) = lookup("RELAYBUS_MAX_FRAGMENT_BYTES") {
            match raw.parse::<usize>() {
                Ok(bytes) => config = config.with_max_fragment_bytes(bytes),
                Err(_) => warn!(value = %raw, "invalid RELAYBUS_MAX_FRAGMENT_BYTES; using default"),
            }
        }

        if let Some(raw) = lookup("RELAYBUS_REASSEMBLY_TTL_SECS") {
            match raw.parse::<u64>() {
                Ok(secs) => config = config.with_reassembly_ttl(Duration::from_secs(secs)),
                Err(_) => warn!(value = %raw, "invalid RELAYBUS_REASSEMBLY_TTL_SECS; not evicting"),
            }
        }

        Ok(config)
    }
}
