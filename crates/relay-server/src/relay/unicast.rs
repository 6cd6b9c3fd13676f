//! Targeted delivery to a single session by ID.

use std::sync::Arc;

use metrics::counter;
use relay_core::{ConnectionId, Frame, RelayError};
use tracing::{debug, warn};

use super::lifecycle::{DisconnectReason, SessionLifecycle};
use crate::metrics::{SEND_FAILURES_TOTAL, UNICAST_TOTAL};

/// Routes a frame to exactly one session.
pub struct UnicastRouter {
    lifecycle: Arc<SessionLifecycle>,
}

impl UnicastRouter {
    /// Create a router over `lifecycle`'s registry.
    pub fn new(lifecycle: Arc<SessionLifecycle>) -> Self {
        Self { lifecycle }
    }

    /// Deliver `frame` to `target`.
    ///
    /// Fails with [`RelayError::ConnectionNotFound`] without side effects if
    /// the target is not registered or is on a channel that does not carry
    /// the frame's kind. A failed send disconnects the target and returns
    /// the send error.
    pub async fn send_to(&self, target: &ConnectionId, frame: Frame) -> Result<(), RelayError> {
        let Some(session) = self
            .lifecycle
            .registry()
            .lookup(target)
            .filter(|session| session.accepts(&frame))
        else {
            counter!(UNICAST_TOTAL, "outcome" => "not_found").increment(1);
            debug!(target_id = %target, kind = ?frame.kind(), "no unicast target for frame");
            return Err(RelayError::ConnectionNotFound(target.clone()));
        };

        match session.send(frame).await {
            Ok(()) => {
                counter!(UNICAST_TOTAL, "outcome" => "delivered").increment(1);
                Ok(())
            }
            Err(e) => {
                counter!(UNICAST_TOTAL, "outcome" => "failed").increment(1);
                counter!(SEND_FAILURES_TOTAL).increment(1);
                warn!(target_id = %target, error = %e, "unicast send failed, dropping target");
                let _ = self.lifecycle.disconnect(target, DisconnectReason::SendFailed);
                Err(e)
            }
        }
    }
}
