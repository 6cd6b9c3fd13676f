//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

use crate::relay::{Channel, ConnectionRegistry};

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while serving, `"shutting_down"` once shutdown has begun.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Live sessions across all channels.
    pub connections: usize,
    /// Live text sessions.
    pub text_sessions: usize,
    /// Live image sessions.
    pub image_sessions: usize,
}

/// Build a health response from the registry.
pub fn health_check(
    start_time: Instant,
    registry: &ConnectionRegistry,
    shutting_down: bool,
) -> HealthResponse {
    HealthResponse {
        status: if shutting_down { "shutting_down" } else { "ok" }.into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections: registry.len(),
        text_sessions: registry.count(Channel::Text),
        image_sessions: registry.count(Channel::Image),
    }
}
