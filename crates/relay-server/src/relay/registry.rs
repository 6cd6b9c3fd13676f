//! Connection registry: the authoritative set of live sessions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use relay_core::ConnectionId;

use super::session::{Channel, Session, Transport};

/// Default time a send may wait on a full queue.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Maps connection IDs to their sessions.
///
/// The lock guards only map operations. Nothing performs I/O or awaits
/// while holding it; callers iterate a [`snapshot`](Self::snapshot).
pub struct ConnectionRegistry {
    sessions: Mutex<HashMap<ConnectionId, Arc<Session>>>,
    send_timeout: Duration,
}

impl ConnectionRegistry {
    /// Create an empty registry whose sessions use `send_timeout`.
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            send_timeout,
        }
    }

    /// Register a transport under a fresh ID and return the ID.
    pub fn register(&self, transport: Transport, channel: Channel) -> ConnectionId {
        self.register_session(transport, channel).id().clone()
    }

    /// Register a transport under a fresh ID and return the session.
    ///
    /// The session becomes `Active` under the same lock that inserts it, so
    /// it is never observable in the registry while still connecting.
    pub fn register_session(&self, transport: Transport, channel: Channel) -> Arc<Session> {
        let session = Arc::new(Session::new(
            ConnectionId::new(),
            channel,
            transport,
            self.send_timeout,
        ));
        let mut sessions = self.sessions.lock();
        let _ = session.activate();
        let _ = sessions.insert(session.id().clone(), Arc::clone(&session));
        session
    }

    /// Remove a session. Idempotent: unknown IDs return `None`.
    ///
    /// The removed session is marked disconnected before the lock is
    /// released, waking its connection tasks.
    pub fn unregister(&self, id: &ConnectionId) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.lock();
        let removed = sessions.remove(id);
        if let Some(ref session) = removed {
            let _ = session.mark_disconnected();
        }
        removed
    }

    /// Look up a live session.
    pub fn lookup(&self, id: &ConnectionId) -> Option<Arc<Session>> {
        self.sessions.lock().get(id).cloned()
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.sessions.lock().contains_key(id)
    }

    /// Copy of the current membership, ordered by ID.
    ///
    /// Later registrations and removals do not affect the returned list.
    pub fn snapshot(&self) -> Vec<(ConnectionId, Arc<Session>)> {
        let mut entries: Vec<_> = {
            let sessions = self.sessions.lock();
            sessions
                .iter()
                .map(|(id, session)| (id.clone(), Arc::clone(session)))
                .collect()
        };
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Number of live sessions on `channel`.
    pub fn count(&self, channel: Channel) -> usize {
        self.sessions
            .lock()
            .values()
            .filter(|s| s.channel() == channel)
            .count()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SEND_TIMEOUT)
    }
}
