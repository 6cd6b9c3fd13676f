//! Outbound payloads carried over a session's transport.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Whether a frame carries text or binary data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    /// UTF-8 text.
    Text,
    /// Opaque bytes (relayed images).
    Binary,
}

/// A single message queued for delivery to one session.
///
/// Both variants are cheap to clone so one broadcast can hand the same
/// payload to every recipient without copying it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text payload.
    Text(Arc<str>),
    /// Binary payload.
    Binary(Bytes),
}

impl Frame {
    /// Build a text frame.
    pub fn text(text: impl Into<Arc<str>>) -> Self {
        Self::Text(text.into())
    }

    /// Build a binary frame.
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::Binary(data.into())
    }

    /// Serialize a JSON value into a text frame.
    pub fn json(value: &serde_json::Value) -> Self {
        Self::Text(value.to_string().into())
    }

    /// The frame's kind.
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Text(_) => FrameKind::Text,
            Self::Binary(_) => FrameKind::Binary,
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(t) => t.len(),
            Self::Binary(b) => b.len(),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text content, if this is a text frame.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Binary(_) => None,
        }
    }
}
