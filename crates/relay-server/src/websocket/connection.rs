//! Outbound side of one `WebSocket` connection.
//!
//! The writer owns the socket's sink. It drains the session's transport
//! queue, sends periodic Ping frames, and stops when the session is
//! disconnected, the socket fails, or the client goes quiet for longer
//! than the heartbeat timeout.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use bytes::Bytes;
use futures::{Sink, SinkExt};
use relay_core::Frame;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::relay::{DisconnectReason, Session};

/// Ping cadence and liveness window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Heartbeat {
    /// Interval between Ping frames.
    pub interval: Duration,
    /// Inbound silence after which the connection is dropped.
    pub timeout: Duration,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(90),
        }
    }
}

/// Why a writer stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterExit {
    /// The session was disconnected elsewhere; a Close frame was sent.
    Closed,
    /// Writing to the socket failed.
    TransportError,
    /// No inbound activity within the heartbeat timeout.
    HeartbeatTimeout,
}

impl WriterExit {
    /// Disconnect reason to record for this exit.
    pub fn reason(self) -> DisconnectReason {
        match self {
            // already unregistered, so the reason is never recorded
            Self::Closed => DisconnectReason::ClientClosed,
            Self::TransportError => DisconnectReason::TransportError,
            Self::HeartbeatTimeout => DisconnectReason::HeartbeatTimeout,
        }
    }
}

/// Convert a queued frame into a `WebSocket` message.
pub fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text((&*text).into()),
        Frame::Binary(data) => Message::Binary(data),
    }
}

/// Pump `outbound` into `sink` until the connection ends.
pub async fn run_writer<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<Frame>,
    session: Arc<Session>,
    heartbeat: Heartbeat,
) -> WriterExit
where
    S: Sink<Message> + Unpin,
{
    let mut ping = tokio::time::interval(heartbeat.interval.max(Duration::from_millis(1)));
    // Skip the immediate first tick
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            () = session.closed() => {
                let _ = sink.send(Message::Close(None)).await;
                return WriterExit::Closed;
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    return WriterExit::Closed;
                };
                if sink.send(to_message(frame)).await.is_err() {
                    debug!(conn_id = %session.id(), "socket write failed");
                    return WriterExit::TransportError;
                }
            }
            _ = ping.tick() => {
                let idle = session.idle();
                if idle > heartbeat.timeout {
                    warn!(conn_id = %session.id(), idle_ms = idle.as_millis(), "client unresponsive, disconnecting");
                    let _ = sink.send(Message::Close(None)).await;
                    return WriterExit::HeartbeatTimeout;
                }
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    return WriterExit::TransportError;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{Channel, ConnectionRegistry, Transport};
    use futures::StreamExt;
    use futures::channel::mpsc as fmpsc;

    fn session(capacity: usize) -> (Arc<ConnectionRegistry>, Arc<Session>, mpsc::Receiver<Frame>) {
        let registry = Arc::new(ConnectionRegistry::default());
        let (transport, rx) = Transport::channel(capacity);
        let session = registry.register_session(transport, Channel::Text);
        (registry, session, rx)
    }

    #[test]
    fn frames_map_to_messages() {
        assert!(matches!(to_message(Frame::text("hi")), Message::Text(t) if t.as_str() == "hi"));
        assert!(matches!(to_message(Frame::binary(vec![1u8, 2])), Message::Binary(b) if b.len() == 2));
    }

    #[tokio::test]
    async fn forwards_queued_frames() {
        let (_registry, session, rx) = session(8);
        let (sink, mut written) = fmpsc::unbounded::<Message>();
        let writer = tokio::spawn(run_writer(sink, rx, Arc::clone(&session), Heartbeat::default()));

        session.send(Frame::text("one")).await.unwrap();
        session.send(Frame::binary(vec![7u8])).await.unwrap();

        assert!(matches!(written.next().await, Some(Message::Text(t)) if t.as_str() == "one"));
        assert!(matches!(written.next().await, Some(Message::Binary(b)) if b[..] == [7u8]));
        writer.abort();
    }

    #[tokio::test]
    async fn disconnect_sends_close_and_exits() {
        let (registry, session, rx) = session(8);
        let (sink, mut written) = fmpsc::unbounded::<Message>();
        let writer = tokio::spawn(run_writer(sink, rx, Arc::clone(&session), Heartbeat::default()));

        let _ = registry.unregister(session.id());

        assert_eq!(writer.await.unwrap(), WriterExit::Closed);
        assert!(matches!(written.next().await, Some(Message::Close(None))));
    }

    #[tokio::test]
    async fn broken_sink_is_transport_error() {
        let (_registry, session, rx) = session(8);
        let (sink, written) = fmpsc::unbounded::<Message>();
        drop(written);
        let writer = tokio::spawn(run_writer(sink, rx, Arc::clone(&session), Heartbeat::default()));

        session.send(Frame::text("lost")).await.unwrap();

        assert_eq!(writer.await.unwrap(), WriterExit::TransportError);
    }

    #[tokio::test(start_paused = true)]
    async fn pings_then_times_out_when_silent() {
        let (_registry, session, rx) = session(8);
        let (sink, written) = fmpsc::unbounded::<Message>();
        let heartbeat = Heartbeat {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(25),
        };

        let exit = run_writer(sink, rx, Arc::clone(&session), heartbeat).await;

        assert_eq!(exit, WriterExit::HeartbeatTimeout);
        assert_eq!(exit.reason(), DisconnectReason::HeartbeatTimeout);
        let messages: Vec<_> = written.collect().await;
        let pings = messages.iter().filter(|m| matches!(m, Message::Ping(_))).count();
        assert_eq!(pings, 2);
        assert!(matches!(messages.last(), Some(Message::Close(None))));
    }

    #[tokio::test(start_paused = true)]
    async fn activity_keeps_connection_alive() {
        let (registry, session, rx) = session(8);
        let (sink, _written) = fmpsc::unbounded::<Message>();
        let heartbeat = Heartbeat {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(25),
        };
        let writer = tokio::spawn(run_writer(sink, rx, Arc::clone(&session), heartbeat));

        for _ in 0..6 {
            tokio::time::sleep(Duration::from_secs(10)).await;
            session.touch();
        }
        assert!(!writer.is_finished());

        let _ = registry.unregister(session.id());
        assert_eq!(writer.await.unwrap(), WriterExit::Closed);
    }
}
