//! `WebSocket` connection handling: per-connection writer and heartbeat,
//! inbound frame dispatch, and the JSON notices sent to text clients.

pub mod connection;
pub mod envelope;
pub mod handler;
pub mod session;

pub use handler::Route;
pub use session::{SessionOptions, run_ws_session};
