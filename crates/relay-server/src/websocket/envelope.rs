//! JSON notices the server sends to text clients.
//!
//! Every notice carries a `type` discriminator and an RFC 3339 `timestamp`.

use chrono::Utc;
use relay_core::{ConnectionId, Frame, RelayError};
use serde_json::json;

fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

/// `{"type":"system"}` greeting telling a client its own ID.
pub fn welcome(id: &ConnectionId) -> Frame {
    Frame::json(&json!({
        "type": "system",
        "message": format!("Connected successfully! Your ID: {id}"),
        "clientId": id,
        "timestamp": timestamp(),
    }))
}

/// `{"type":"notification"}` announcing a join and the text session count.
pub fn joined(total: usize) -> Frame {
    Frame::json(&json!({
        "type": "notification",
        "message": format!("New user joined. Total users: {total}"),
        "timestamp": timestamp(),
    }))
}

/// `{"type":"error"}` returned to a sender whose targeted message failed.
pub fn delivery_error(error: &RelayError, target: &ConnectionId) -> Frame {
    Frame::json(&json!({
        "type": "error",
        "code": error.code(),
        "message": error.to_string(),
        "target": target,
        "timestamp": timestamp(),
    }))
}

/// `{"type":"broadcast"}` wrapper for text injected over HTTP.
pub fn server_broadcast(content: &str) -> Frame {
    Frame::json(&json!({
        "type": "broadcast",
        "from": "server",
        "content": content,
        "timestamp": timestamp(),
    }))
}
