//! Per-connection session state and its exclusively owned transport.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use relay_core::{ConnectionId, Frame, FrameKind, RelayError, SendFailureReason};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Which endpoint a session was accepted on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Text chat, broadcast or targeted mode.
    Text,
    /// Binary image relay.
    Image,
}

impl Channel {
    /// Whether sessions on this channel receive frames of `kind`.
    pub fn carries(self, kind: FrameKind) -> bool {
        matches!(
            (self, kind),
            (Self::Text, FrameKind::Text) | (Self::Image, FrameKind::Binary)
        )
    }

    /// Lowercase name used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }
}

/// Session lifecycle state. `Disconnected` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Constructed but not yet visible in the registry.
    Connecting,
    /// Registered and eligible for delivery.
    Active,
    /// Removed from the registry; never re-activated.
    Disconnected,
}

/// Sending half of a connection's outbound queue.
///
/// Not `Clone`: exactly one [`Session`] owns it, and the paired receiver
/// belongs to that connection's writer task.
#[derive(Debug)]
pub struct Transport {
    tx: mpsc::Sender<Frame>,
}

impl Transport {
    /// Create a transport with room for `capacity` queued frames.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

struct Activity {
    at: DateTime<Utc>,
    seen: Instant,
}

/// Point-in-time view of a session, for listings.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Connection ID.
    pub id: ConnectionId,
    /// Channel the session was accepted on.
    pub channel: Channel,
    /// Lifecycle state.
    pub state: SessionState,
    /// Registration time.
    pub connected_at: DateTime<Utc>,
    /// Last inbound activity.
    pub last_active: DateTime<Utc>,
    /// Frames successfully queued to this session.
    pub delivered: u64,
    /// Sends that failed.
    pub failed: u64,
}

/// One accepted connection: identity, transport and metadata.
pub struct Session {
    id: ConnectionId,
    channel: Channel,
    transport: Transport,
    send_timeout: Duration,
    state: Mutex<SessionState>,
    connected_at: DateTime<Utc>,
    opened: Instant,
    activity: Mutex<Activity>,
    closed: CancellationToken,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl Session {
    pub(crate) fn new(
        id: ConnectionId,
        channel: Channel,
        transport: Transport,
        send_timeout: Duration,
    ) -> Self {
        let now = Utc::now();
        let seen = Instant::now();
        Self {
            id,
            channel,
            transport,
            send_timeout,
            state: Mutex::new(SessionState::Connecting),
            connected_at: now,
            opened: seen,
            activity: Mutex::new(Activity { at: now, seen }),
            closed: CancellationToken::new(),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Connection ID.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Channel the session was accepted on.
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Whether the session is `Active`.
    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Registration time.
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Time of the last inbound activity.
    pub fn last_active(&self) -> DateTime<Utc> {
        self.activity.lock().at
    }

    /// Record inbound activity (any frame, including pongs).
    pub fn touch(&self) {
        let mut activity = self.activity.lock();
        activity.at = Utc::now();
        activity.seen = Instant::now();
    }

    /// Time since the last inbound activity.
    pub fn idle(&self) -> Duration {
        self.activity.lock().seen.elapsed()
    }

    /// Time since the session was created.
    pub fn age(&self) -> Duration {
        self.opened.elapsed()
    }

    /// Whether broadcasts of `frame` are addressed to this session.
    pub fn accepts(&self, frame: &Frame) -> bool {
        self.channel.carries(frame.kind())
    }

    /// Queue a frame for the connection's writer.
    ///
    /// Waits up to the send timeout while the queue is full. Fails if the
    /// session is already disconnected, the writer is gone, or the wait
    /// times out.
    pub async fn send(&self, frame: Frame) -> Result<(), RelayError> {
        if self.state() == SessionState::Disconnected {
            let _ = self.failed.fetch_add(1, Ordering::Relaxed);
            return Err(RelayError::Disconnect(self.id.clone()));
        }
        match self.transport.tx.send_timeout(frame, self.send_timeout).await {
            Ok(()) => {
                let _ = self.delivered.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => Err(self.failure(SendFailureReason::TimedOut)),
            Err(SendTimeoutError::Closed(_)) => Err(self.failure(SendFailureReason::Closed)),
        }
    }

    fn failure(&self, reason: SendFailureReason) -> RelayError {
        let _ = self.failed.fetch_add(1, Ordering::Relaxed);
        RelayError::SendFailure {
            id: self.id.clone(),
            reason,
        }
    }

    /// Resolves once the session has been disconnected.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Whether the session has been disconnected.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Frames successfully queued to this session.
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Sends that failed.
    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Snapshot for listings.
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            channel: self.channel,
            state: self.state(),
            connected_at: self.connected_at,
            last_active: self.last_active(),
            delivered: self.delivered_count(),
            failed: self.failed_count(),
        }
    }

    /// `Connecting → Active`. Returns `false` from any other state.
    pub(crate) fn activate(&self) -> bool {
        let mut state = self.state.lock();
        if *state == SessionState::Connecting {
            *state = SessionState::Active;
            true
        } else {
            false
        }
    }

    /// Move to `Disconnected` and wake everything waiting on [`closed`].
    ///
    /// Returns `false` if the session was already disconnected.
    ///
    /// [`closed`]: Session::closed
    pub(crate) fn mark_disconnected(&self) -> bool {
        let mut state = self.state.lock();
        if *state == SessionState::Disconnected {
            return false;
        }
        *state = SessionState::Disconnected;
        self.closed.cancel();
        true
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
