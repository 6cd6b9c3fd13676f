//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`
//! so a settings file only needs the keys it overrides.

mod server;

pub use server::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// # JSON Format
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "image": { "maxWidth": 1280, "maxHeight": 720 },
///   "logging": { "level": "debug", "format": "json" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Network, queueing and liveness settings.
    pub server: ServerSettings,
    /// Image relay settings.
    pub image: ImageSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}
