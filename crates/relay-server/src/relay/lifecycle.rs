//! Session accept and disconnect.

use std::sync::Arc;

use metrics::{counter, gauge, histogram};
use relay_core::ConnectionId;
use serde::Serialize;
use tracing::{debug, info};

use super::registry::ConnectionRegistry;
use super::session::{Channel, Session, Transport};
use crate::metrics::{
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
    WS_SESSION_DURATION_SECONDS,
};

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// The client sent a Close frame or the stream ended.
    ClientClosed,
    /// Reading from or writing to the socket failed.
    TransportError,
    /// A send to this session failed during delivery.
    SendFailed,
    /// No inbound activity within the heartbeat timeout.
    HeartbeatTimeout,
    /// Closed through the admin API.
    Administrative,
    /// The server is shutting down.
    Shutdown,
}

impl DisconnectReason {
    /// Snake-case name used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::TransportError => "transport_error",
            Self::SendFailed => "send_failed",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::Administrative => "administrative",
            Self::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Moves sessions into and out of the registry.
pub struct SessionLifecycle {
    registry: Arc<ConnectionRegistry>,
}

impl SessionLifecycle {
    /// Create a lifecycle manager over `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Accept a new connection: register it and mark it active.
    pub fn accept(&self, transport: Transport, channel: Channel) -> Arc<Session> {
        let session = self.registry.register_session(transport, channel);
        counter!(WS_CONNECTIONS_TOTAL, "channel" => channel.as_str()).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        info!(
            conn_id = %session.id(),
            channel = channel.as_str(),
            total = self.registry.len(),
            "session accepted"
        );
        session
    }

    /// Disconnect a session. Safe to call more than once.
    ///
    /// Returns `true` if this call removed the session.
    pub fn disconnect(&self, id: &ConnectionId, reason: DisconnectReason) -> bool {
        let Some(session) = self.registry.unregister(id) else {
            debug!(conn_id = %id, %reason, "disconnect of unknown session ignored");
            return false;
        };
        let duration = session.age();
        counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        histogram!(WS_SESSION_DURATION_SECONDS).record(duration.as_secs_f64());
        info!(
            conn_id = %id,
            channel = session.channel().as_str(),
            %reason,
            duration_secs = duration.as_secs(),
            delivered = session.delivered_count(),
            remaining = self.registry.len(),
            "session disconnected"
        );
        true
    }

    /// Disconnect every live session. Returns how many were removed.
    pub fn disconnect_all(&self, reason: DisconnectReason) -> usize {
        self.registry
            .snapshot()
            .into_iter()
            .filter(|(id, _)| self.disconnect(id, reason))
            .count()
    }
}
