//! Fan-out delivery to every live session on a frame's channel.

use std::sync::Arc;

use futures::future::join_all;
use metrics::counter;
use relay_core::{ConnectionId, Frame, FrameKind};
use tracing::{debug, warn};

use super::lifecycle::{DisconnectReason, SessionLifecycle};
use crate::metrics::{BROADCASTS_TOTAL, DELIVERIES_TOTAL, SEND_FAILURES_TOTAL};

/// Delivers a frame to all matching sessions.
///
/// Recipients are taken from a registry snapshot, so sessions that connect
/// mid-broadcast are skipped and sessions that leave mid-broadcast fail
/// quietly. A failure on one recipient never blocks delivery to the rest;
/// the failed recipient is disconnected.
pub struct BroadcastDispatcher {
    lifecycle: Arc<SessionLifecycle>,
}

impl BroadcastDispatcher {
    /// Create a dispatcher over `lifecycle`'s registry.
    pub fn new(lifecycle: Arc<SessionLifecycle>) -> Self {
        Self { lifecycle }
    }

    /// Send `frame` to every session whose channel carries it, except
    /// `exclude`. Returns the number of successful deliveries.
    pub async fn broadcast(&self, frame: Frame, exclude: Option<&ConnectionId>) -> usize {
        let kind = frame.kind();
        let recipients: Vec<_> = self
            .lifecycle
            .registry()
            .snapshot()
            .into_iter()
            .filter(|(id, session)| exclude != Some(id) && session.accepts(&frame))
            .collect();

        let results = join_all(
            recipients
                .iter()
                .map(|(_, session)| session.send(frame.clone())),
        )
        .await;

        let mut delivered = 0;
        for ((id, _), result) in recipients.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(conn_id = %id, error = %e, "broadcast send failed, dropping recipient");
                    counter!(SEND_FAILURES_TOTAL).increment(1);
                    let _ = self.lifecycle.disconnect(id, DisconnectReason::SendFailed);
                }
            }
        }

        counter!(BROADCASTS_TOTAL, "kind" => kind_label(kind)).increment(1);
        counter!(DELIVERIES_TOTAL).increment(delivered as u64);
        debug!(
            kind = kind_label(kind),
            bytes = frame.len(),
            attempted = recipients.len(),
            delivered,
            "broadcast complete"
        );
        delivered
    }
}

fn kind_label(kind: FrameKind) -> &'static str {
    match kind {
        FrameKind::Text => "text",
        FrameKind::Binary => "binary",
    }
}
