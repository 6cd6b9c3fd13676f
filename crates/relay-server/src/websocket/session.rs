//! `WebSocket` session driver: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocket;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, field, info, instrument};

use super::connection::{Heartbeat, WriterExit, run_writer};
use super::envelope;
use super::handler::{FrameOutcome, Route, handle_frame};
use crate::config::ServerConfig;
use crate::relay::{Channel, DisconnectReason, Relay, Session, Transport};

/// How long the writer gets to flush its Close frame after the receive
/// loop ends.
const WRITER_DRAIN: Duration = Duration::from_secs(1);

/// Per-connection settings taken from [`ServerConfig`].
#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    /// Outbound queue depth.
    pub send_queue_capacity: usize,
    /// Ping cadence and liveness window.
    pub heartbeat: Heartbeat,
}

impl From<&ServerConfig> for SessionOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            send_queue_capacity: config.send_queue_capacity,
            heartbeat: Heartbeat {
                interval: config.heartbeat_interval(),
                timeout: config.heartbeat_timeout(),
            },
        }
    }
}

/// Run a `WebSocket` session for a connected client.
///
/// 1. Registers the session (closing it at once if `shutdown` has fired)
///    and starts its writer
/// 2. Greets the client (text routes only)
/// 3. Dispatches inbound frames according to `route`
/// 4. Disconnects with the reason the loop ended on
#[instrument(skip_all, fields(route = route.name(), conn_id = field::Empty))]
pub async fn run_ws_session(
    ws: WebSocket,
    relay: Arc<Relay>,
    route: Route,
    options: SessionOptions,
    shutdown: CancellationToken,
) {
    let (ws_tx, mut ws_rx) = ws.split();
    let (transport, outbound) = Transport::channel(options.send_queue_capacity);
    let session = admit(&relay, transport, route.channel(), &shutdown);
    let _ = Span::current().record("conn_id", session.id().as_str());

    let mut writer = tokio::spawn(run_writer(
        ws_tx,
        outbound,
        Arc::clone(&session),
        options.heartbeat,
    ));

    if !session.is_closed() {
        greet(&relay, &session, &route).await;
    }

    let reason = loop {
        tokio::select! {
            biased;
            () = session.closed() => break None,
            exit = &mut writer => {
                break Some(exit.map_or(DisconnectReason::TransportError, WriterExit::reason));
            }
            msg = ws_rx.next() => match msg {
                Some(Ok(msg)) => {
                    if let FrameOutcome::Close(reason) = handle_frame(&relay, &session, &route, msg).await {
                        break Some(reason);
                    }
                }
                Some(Err(e)) => {
                    debug!(error = %e, "socket read failed");
                    break Some(DisconnectReason::TransportError);
                }
                None => break Some(DisconnectReason::ClientClosed),
            },
        }
    };

    if let Some(reason) = reason {
        let _ = relay.lifecycle().disconnect(session.id(), reason);
    }
    if !writer.is_finished() && tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
        writer.abort();
    }
}

/// Register a session, then close it if shutdown has already begun.
///
/// The check follows registration: an upgrade that completes after the
/// server's `disconnect_all` pass would otherwise stay registered.
fn admit(
    relay: &Relay,
    transport: Transport,
    channel: Channel,
    shutdown: &CancellationToken,
) -> Arc<Session> {
    let session = relay.lifecycle().accept(transport, channel);
    if shutdown.is_cancelled() {
        info!(conn_id = %session.id(), "session arrived during shutdown");
        let _ = relay
            .lifecycle()
            .disconnect(session.id(), DisconnectReason::Shutdown);
    }
    session
}

/// Send the welcome notice and, in broadcast mode, announce the join to
/// every text session including the newcomer.
async fn greet(relay: &Relay, session: &Arc<Session>, route: &Route) {
    if *route == Route::Image {
        return;
    }
    if let Err(e) = session.send(envelope::welcome(session.id())).await {
        debug!(error = %e, "welcome not delivered");
        let _ = relay.lifecycle().disconnect(session.id(), DisconnectReason::SendFailed);
        return;
    }
    if *route == Route::Broadcast {
        let total = relay.registry().count(Channel::Text);
        let _ = relay.broadcast().broadcast(envelope::joined(total), None).await;
    }
}
