//! Server configuration.

use std::time::Duration;

use relay_settings::RelaySettings;
use serde::{Deserialize, Serialize};

use crate::relay::image::{DEFAULT_JPEG_QUALITY, ImageBounds};

/// Configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Max inbound `WebSocket` message and upload size in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per session.
    pub send_queue_capacity: usize,
    /// How long a send may wait on a full queue, in milliseconds.
    pub send_timeout_ms: u64,
    /// Ping interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Disconnect after this much inbound silence, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Bounding box for relayed images.
    pub image_bounds: ImageBounds,
    /// JPEG quality for relayed images.
    pub jpeg_quality: u8,
}

impl ServerConfig {
    /// Send timeout as a `Duration`.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Ping interval as a `Duration`.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Heartbeat timeout as a `Duration`.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_message_size: 16 * 1024 * 1024, // 16 MB
            send_queue_capacity: 256,
            send_timeout_ms: 5_000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            image_bounds: ImageBounds::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl From<&RelaySettings> for ServerConfig {
    fn from(settings: &RelaySettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            max_message_size: server.max_message_size,
            send_queue_capacity: server.send_queue_capacity,
            send_timeout_ms: server.send_timeout_ms,
            heartbeat_interval_ms: server.heartbeat_interval_ms,
            heartbeat_timeout_ms: server.heartbeat_timeout_ms,
            image_bounds: ImageBounds {
                max_width: settings.image.max_width,
                max_height: settings.image.max_height,
            },
            jpeg_quality: settings.image.jpeg_quality,
        }
    }
}
