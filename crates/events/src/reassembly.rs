//! Reassembly of fragments back into envelopes.
//!
//! Fragments of one message may arrive in any order, interleaved with
//! fragments of other messages, and may be delivered more than once. The
//! [`Reassembler`] keys partial messages by id and completes a message as soon
//! as every index `0..count` has been seen.
//!
//! Partial messages whose remaining fragments never arrive stay pending until
//! [`Reassembler::evict_stale`] removes them.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use relaybus_core::MessageId;
use tracing::debug;

use crate::{CodecError, Fragment, RawEventPayload};

#[derive(Debug)]
struct PendingMessage {
    count: u32,
    parts: BTreeMap<u32, String>,
    first_seen: Instant,
}

/// Pending reassembly set, keyed by message id.
#[derive(Debug, Default)]
pub struct Reassembler {
    pending: HashMap<MessageId, PendingMessage>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages with at least one fragment recorded and not yet complete.
    pub fn pending_messages(&self) -> usize {
        self.pending.len()
    }

    /// Record one fragment.
    ///
    /// Returns `Ok(None)` while the message is incomplete and the decoded
    /// envelope once the last missing index arrives. A repeated
    /// `(id, index)` replaces the earlier data.
    ///
    /// Structurally invalid fragments are rejected without touching pending
    /// state. When a complete message fails to decode, its state is already
    /// gone and the error is final.
    pub fn accept(&mut self, fragment: Fragment) -> Result<Option<RawEventPayload>, CodecError> {
        let Fragment {
            id,
            index,
            count,
            data,
        } = fragment;

        if count == 0 {
            return Err(CodecError::MalformedFragment(format!("message {id}: count is zero")));
        }
        if index >= count {
            return Err(CodecError::MalformedFragment(format!(
                "message {id}: index {index} out of range for count {count}"
            )));
        }

        let entry = self.pending.entry(id.clone()).or_insert_with(|| PendingMessage {
            count,
            parts: BTreeMap::new(),
            first_seen: Instant::now(),
        });
        if entry.count != count {
            let expected = entry.count;
            return Err(CodecError::MalformedFragment(format!(
                "message {id}: count {count} disagrees with earlier count {expected}"
            )));
        }

        entry.parts.insert(index, data);
        if entry.parts.len() < count as usize {
            return Ok(None);
        }

        let Some(complete) = self.pending.remove(&id) else {
            return Ok(None);
        };
        let text: String = complete.parts.into_values().collect();

        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| CodecError::MalformedEnvelope {
                message_id: id,
                source,
            })
    }

    /// Drop partial messages whose first fragment arrived at least `max_age` ago.
    ///
    /// Returns the number of messages discarded.
    pub fn evict_stale(&mut self, max_age: Duration) -> usize {
        let before = self.pending.len();
        self.pending.retain(|id, msg| {
            let keep = msg.first_seen.elapsed() < max_age;
            if !keep {
                debug!(
                    message_id = %id,
                    received = msg.parts.len(),
                    count = msg.count,
                    "evicting stale partial message"
                );
            }
            keep
        });
        before - self.pending.len()
    }
}
