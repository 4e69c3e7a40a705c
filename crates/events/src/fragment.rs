//! Fragment codec: splits serialized envelopes into size-bounded fragments.
//!
//! The transport caps message size, so an envelope is serialized to JSON text
//! and cut into consecutive segments. Every segment becomes one [`Fragment`]
//! carrying the shared message id, its position and the total count. The
//! receiving side puts them back together with a
//! [`Reassembler`](crate::Reassembler).
//!
//! Concatenating the `data` of all fragments in ascending `index` order yields
//! the serialized envelope byte for byte; no separators are inserted.

use serde::{Deserialize, Serialize};

use relaybus_core::MessageId;

/// Default maximum `data` size per fragment, in bytes.
pub const DEFAULT_MAX_SEGMENT_BYTES: usize = 100_000;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("maximum segment size must be greater than zero")]
    InvalidSegmentSize,

    #[error("envelope needs {0} segments, more than a fragment count can express")]
    TooManySegments(usize),

    #[error("failed to serialize envelope: {0}")]
    Serialization(#[source] serde_json::Error),

    /// A single transport message that is not a well-formed fragment.
    #[error("malformed fragment: {0}")]
    MalformedFragment(String),

    /// All fragments arrived but their concatenation is not a valid envelope.
    #[error("malformed envelope for message {message_id}: {source}")]
    MalformedEnvelope {
        message_id: MessageId,
        #[source]
        source: serde_json::Error,
    },
}

/// One slice of a serialized envelope, as sent over the transport.
///
/// Wire form: `{"id": "...", "index": 0, "count": 2, "data": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub id: MessageId,
    pub index: u32,
    pub count: u32,
    pub data: String,
}

impl Fragment {
    pub fn to_json(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(CodecError::Serialization)
    }

    /// Parse one transport message.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::MalformedFragment(e.to_string()))
    }
}

/// Serialize `envelope` and split it into fragments of at most
/// `max_segment_bytes` bytes of `data` each.
///
/// All fragments share one freshly generated [`MessageId`]. An envelope that
/// serializes to empty text produces no fragments.
pub fn encode<T: Serialize>(envelope: &T, max_segment_bytes: usize) -> Result<Vec<Fragment>, CodecError> {
    if max_segment_bytes == 0 {
        return Err(CodecError::InvalidSegmentSize);
    }

    let text = serde_json::to_string(envelope).map_err(CodecError::Serialization)?;
    let segments = split_segments(&text, max_segment_bytes);
    let count =
        u32::try_from(segments.len()).map_err(|_| CodecError::TooManySegments(segments.len()))?;

    let id = MessageId::generate();
    Ok(segments
        .into_iter()
        .enumerate()
        .map(|(index, data)| Fragment {
            id: id.clone(),
            index: index as u32,
            count,
            data: data.to_string(),
        })
        .collect())
}

/// Cut `text` into consecutive segments of at most `max_bytes` bytes.
///
/// Cuts only fall on UTF-8 character boundaries. A character wider than
/// `max_bytes` is emitted as a segment of its own.
pub fn split_segments(text: &str, max_bytes: usize) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let mut cut = max_bytes.min(rest.len());
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            cut = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }

        let (head, tail) = rest.split_at(cut);
        segments.push(head);
        rest = tail;
    }

    segments
}
