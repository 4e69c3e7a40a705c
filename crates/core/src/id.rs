//! Opaque identifiers carried on the wire.
//!
//! Both identifiers are plain strings on the wire so that peers written
//! against the same protocol can interoperate whatever token format they
//! generate. Locally generated values always come from a CSPRNG.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IdError;

/// Number of random bytes behind a locally generated [`OriginId`].
pub const ORIGIN_ID_BYTES: usize = 16;

/// Per-process origin token, stamped on every outgoing envelope.
///
/// Used only to recognise echoes of our own messages coming back from the
/// transport. It is not an authentication credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OriginId(String);

/// Identifier shared by every fragment of one logical message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl OriginId {
    /// Generate a fresh origin: 16 bytes from the thread-local CSPRNG, hex encoded.
    pub fn generate() -> Self {
        let bytes: [u8; ORIGIN_ID_BYTES] = rand::random();
        Self(hex::encode(bytes))
    }
}

impl MessageId {
    /// Generate a fresh message id (UUIDv4, 122 random bits).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

macro_rules! impl_string_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.is_empty() {
                    return Err(IdError::invalid(format!("{}: {}", $name, IdError::Empty)));
                }
                Ok(Self(s.to_string()))
            }
        }
    };
}

impl_string_newtype!(OriginId, "OriginId");
impl_string_newtype!(MessageId, "MessageId");
