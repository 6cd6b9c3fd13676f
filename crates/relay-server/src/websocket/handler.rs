//! Inbound frame dispatch for one connection.

use std::sync::Arc;

use axum::extract::ws::Message;
use bytes::Bytes;
use metrics::counter;
use relay_core::{ConnectionId, Frame, RelayError};
use tracing::{debug, info, warn};

use super::envelope;
use crate::metrics::WS_FRAMES_RECEIVED_TOTAL;
use crate::relay::{Channel, DisconnectReason, Relay, Session};

/// Which endpoint a connection came in on, and where its frames go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    /// `/ws/text`: text goes to every other text session.
    Broadcast,
    /// `/ws/text/{target}`: text goes to one session.
    Targeted(ConnectionId),
    /// `/ws/image`: binary frames are transformed and go to every image
    /// session, the sender included.
    Image,
}

impl Route {
    /// Channel sessions on this route join.
    pub fn channel(&self) -> Channel {
        match self {
            Self::Broadcast | Self::Targeted(_) => Channel::Text,
            Self::Image => Channel::Image,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Broadcast => "broadcast",
            Self::Targeted(_) => "targeted",
            Self::Image => "image",
        }
    }
}

/// What the receive loop should do after a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Keep reading.
    Continue,
    /// End the session for this reason.
    Close(DisconnectReason),
}

/// Handle one inbound message.
pub async fn handle_frame(
    relay: &Relay,
    session: &Arc<Session>,
    route: &Route,
    message: Message,
) -> FrameOutcome {
    match message {
        Message::Text(text) => {
            session.touch();
            counter!(WS_FRAMES_RECEIVED_TOTAL, "kind" => "text").increment(1);
            handle_text(relay, session, route, text.as_str()).await
        }
        Message::Binary(data) => {
            session.touch();
            counter!(WS_FRAMES_RECEIVED_TOTAL, "kind" => "binary").increment(1);
            handle_binary(relay, session, route, data).await
        }
        Message::Ping(_) | Message::Pong(_) => {
            session.touch();
            FrameOutcome::Continue
        }
        Message::Close(_) => {
            debug!(conn_id = %session.id(), "client sent close frame");
            FrameOutcome::Close(DisconnectReason::ClientClosed)
        }
    }
}

async fn handle_text(relay: &Relay, session: &Arc<Session>, route: &Route, text: &str) -> FrameOutcome {
    match route {
        Route::Broadcast => {
            let delivered = relay
                .broadcast()
                .broadcast(Frame::text(text), Some(session.id()))
                .await;
            debug!(conn_id = %session.id(), delivered, "text relayed");
            FrameOutcome::Continue
        }
        Route::Targeted(target) => match relay.unicast().send_to(target, Frame::text(text)).await {
            Ok(()) => FrameOutcome::Continue,
            Err(e) => notify_sender(session, target, &e).await,
        },
        Route::Image => {
            debug!(conn_id = %session.id(), "ignoring text frame on image channel");
            FrameOutcome::Continue
        }
    }
}

async fn handle_binary(
    relay: &Relay,
    session: &Arc<Session>,
    route: &Route,
    data: Bytes,
) -> FrameOutcome {
    if *route != Route::Image {
        debug!(conn_id = %session.id(), len = data.len(), "ignoring binary frame on text channel");
        return FrameOutcome::Continue;
    }
    match relay.images().relay(data).await {
        Ok(delivered) => {
            debug!(conn_id = %session.id(), delivered, "image relayed");
        }
        Err(RelayError::DecodeFailure(reason)) => {
            warn!(conn_id = %session.id(), %reason, "dropping undecodable image frame");
        }
        Err(e) => {
            warn!(conn_id = %session.id(), error = %e, "image relay failed");
        }
    }
    FrameOutcome::Continue
}

/// Tell a targeted sender its message was not delivered.
///
/// The sender stays connected unless this notice itself cannot be queued.
async fn notify_sender(session: &Session, target: &ConnectionId, error: &RelayError) -> FrameOutcome {
    info!(conn_id = %session.id(), target_id = %target, code = %error.code(), "targeted delivery failed");
    match session.send(envelope::delivery_error(error, target)).await {
        Ok(()) => FrameOutcome::Continue,
        Err(e) => {
            warn!(conn_id = %session.id(), error = %e, "could not report delivery failure");
            FrameOutcome::Close(DisconnectReason::SendFailed)
        }
    }
}
