//! Error taxonomy for the relay core.
//!
//! [`RelayError`] covers every failure the registry and dispatch paths can
//! report. Each variant maps to a stable machine-readable [`ErrorCode`] that
//! is used on the wire (JSON error notices and HTTP error bodies).
//!
//! Only [`RelayError::ConnectionNotFound`] and [`RelayError::SendFailure`]
//! from a unicast are surfaced to callers. Broadcast send failures and decode
//! failures are absorbed where they occur and only logged.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::ConnectionId;

// ─────────────────────────────────────────────────────────────────────────────
// Error codes
// ─────────────────────────────────────────────────────────────────────────────

/// Wire-format error codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// No registered session holds the requested ID.
    #[serde(rename = "CONNECTION_NOT_FOUND")]
    ConnectionNotFound,
    /// A transport-level send failed.
    #[serde(rename = "SEND_FAILED")]
    SendFailed,
    /// An inbound binary payload is not a decodable image.
    #[serde(rename = "DECODE_FAILED")]
    DecodeFailed,
    /// Re-encoding a relayed image failed.
    #[serde(rename = "ENCODE_FAILED")]
    EncodeFailed,
    /// The transport closed.
    #[serde(rename = "DISCONNECTED")]
    Disconnected,
}

impl ErrorCode {
    /// The code as its wire string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionNotFound => "CONNECTION_NOT_FOUND",
            Self::SendFailed => "SEND_FAILED",
            Self::DecodeFailed => "DECODE_FAILED",
            Self::EncodeFailed => "ENCODE_FAILED",
            Self::Disconnected => "DISCONNECTED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RelayError
// ─────────────────────────────────────────────────────────────────────────────

/// Why a send to a session did not complete.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendFailureReason {
    /// The session's writer has gone away.
    Closed,
    /// The outbound queue stayed full for longer than the send timeout.
    TimedOut,
}

impl fmt::Display for SendFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "transport closed",
            Self::TimedOut => "send timed out",
        })
    }
}

/// Errors produced by the registry, dispatchers and image pipeline.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Unicast target has no registered session at send time.
    #[error("connection {0} not found")]
    ConnectionNotFound(ConnectionId),

    /// A transport-level send to one session failed.
    #[error("send to {id} failed: {reason}")]
    SendFailure {
        /// Intended recipient.
        id: ConnectionId,
        /// What went wrong.
        reason: SendFailureReason,
    },

    /// Inbound bytes could not be decoded as an image.
    #[error("image decode failed: {0}")]
    DecodeFailure(String),

    /// A decoded image could not be re-encoded.
    #[error("image encode failed: {0}")]
    EncodeFailure(String),

    /// The session had already been disconnected when a send was attempted.
    #[error("connection {0} disconnected")]
    Disconnect(ConnectionId),
}

impl RelayError {
    /// Machine-readable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ConnectionNotFound(_) => ErrorCode::ConnectionNotFound,
            Self::SendFailure { .. } => ErrorCode::SendFailed,
            Self::DecodeFailure(_) => ErrorCode::DecodeFailed,
            Self::EncodeFailure(_) => ErrorCode::EncodeFailed,
            Self::Disconnect(_) => ErrorCode::Disconnected,
        }
    }

    /// The session the error concerns, if any.
    pub fn connection_id(&self) -> Option<&ConnectionId> {
        match self {
            Self::ConnectionNotFound(id) | Self::Disconnect(id) | Self::SendFailure { id, .. } => {
                Some(id)
            }
            Self::DecodeFailure(_) | Self::EncodeFailure(_) => None,
        }
    }
}

/// Result alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn not_found_display_and_code() {
        let err = RelayError::ConnectionNotFound(ConnectionId::from("b1"));
        assert_eq!(err.to_string(), "connection b1 not found");
        assert_eq!(err.code(), ErrorCode::ConnectionNotFound);
        assert_eq!(err.connection_id().map(ConnectionId::as_str), Some("b1"));
    }

    #[test]
    fn send_failure_display() {
        let err = RelayError::SendFailure {
            id: ConnectionId::from("c1"),
            reason: SendFailureReason::TimedOut,
        };
        assert_eq!(err.to_string(), "send to c1 failed: send timed out");
        assert_eq!(err.code().as_str(), "SEND_FAILED");
    }

    #[test]
    fn decode_failure_has_no_connection() {
        let err = RelayError::DecodeFailure("bad magic".into());
        assert!(err.connection_id().is_none());
        assert_eq!(err.code(), ErrorCode::DecodeFailed);
        assert!(err.to_string().contains("bad magic"));
    }

    #[test]
    fn disconnect_code() {
        let err = RelayError::Disconnect(ConnectionId::from("c2"));
        assert_eq!(err.to_string(), "connection c2 disconnected");
        assert_eq!(err.code(), ErrorCode::Disconnected);
    }

    #[test]
    fn error_code_serializes_screaming() {
        let json = serde_json::to_string(&ErrorCode::ConnectionNotFound).unwrap();
        assert_eq!(json, "\"CONNECTION_NOT_FOUND\"");
        let back: ErrorCode = serde_json::from_str("\"SEND_FAILED\"").unwrap();
        assert_matches!(back, ErrorCode::SendFailed);
    }

    #[test]
    fn error_code_display_matches_serde() {
        for code in [
            ErrorCode::ConnectionNotFound,
            ErrorCode::SendFailed,
            ErrorCode::DecodeFailed,
            ErrorCode::EncodeFailed,
            ErrorCode::Disconnected,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json.trim_matches('"'), code.to_string());
        }
    }

    #[test]
    fn send_failure_reason_serializes_snake_case() {
        let json = serde_json::to_string(&SendFailureReason::TimedOut).unwrap();
        assert_eq!(json, "\"timed_out\"");
    }
}
