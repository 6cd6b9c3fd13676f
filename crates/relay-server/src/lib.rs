//! # relay-server
//!
//! Real-time relay over `WebSocket`, served with Axum.
//!
//! - Connection registry and session lifecycle ([`relay`])
//! - Broadcast, unicast and image relay dispatch
//! - `WebSocket` endpoints: `/ws/text`, `/ws/text/{target}`, `/ws/image`
//! - HTTP injection (`/broadcast/*`), admin (`/connections`), `/health`, `/metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod health;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use relay::Relay;
pub use server::RelayServer;
