//! Server, image and logging settings.

use relay_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

/// Network, queueing and liveness settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Maximum inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per session before sends start waiting.
    pub send_queue_capacity: usize,
    /// How long a send may wait on a full queue before it fails.
    pub send_timeout_ms: u64,
    /// Interval between server Ping frames.
    pub heartbeat_interval_ms: u64,
    /// Silence after which a session is disconnected.
    pub heartbeat_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
            max_message_size: 16 * 1024 * 1024,
            send_queue_capacity: 256,
            send_timeout_ms: 5_000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
        }
    }
}

/// Image relay settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageSettings {
    /// Bounding box width; wider images are downscaled.
    pub max_width: u32,
    /// Bounding box height; taller images are downscaled.
    pub max_height: u32,
    /// JPEG quality (1-100) for relayed frames.
    pub jpeg_quality: u8,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            max_width: 800,
            max_height: 600,
            jpeg_quality: 75,
        }
    }
}

/// Log verbosity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace-level (most verbose).
    Trace,
    /// Debug-level.
    Debug,
    /// Info-level (default).
    #[default]
    Info,
    /// Warning-level.
    Warn,
    /// Error-level.
    Error,
}

impl LogLevel {
    /// Convert to a tracing filter string.
    pub fn as_filter_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level written to stderr.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
}
