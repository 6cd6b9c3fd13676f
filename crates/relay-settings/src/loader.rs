//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `RELAY_*` environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{LogLevel, RelaySettings};

/// Resolve the default settings file path (`~/.relay/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".relay").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RelaySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or out-of-range values are
/// errors.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    let defaults = serde_json::to_value(RelaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: RelaySettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, |name| std::env::var(name).ok());
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `RELAY_*` overrides read through `lookup`.
///
/// Values that fail to parse or fall outside their range are logged and
/// ignored, leaving the file/default value in place.
pub fn apply_overrides(settings: &mut RelaySettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("RELAY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.ranged("RELAY_PORT", 0u16, u16::MAX) {
        settings.server.port = v;
    }
    if let Some(v) = env.ranged("RELAY_MAX_MESSAGE_SIZE", 1024usize, 1 << 30) {
        settings.server.max_message_size = v;
    }
    if let Some(v) = env.ranged("RELAY_SEND_QUEUE", 1usize, 65_536) {
        settings.server.send_queue_capacity = v;
    }
    if let Some(v) = env.ranged("RELAY_SEND_TIMEOUT_MS", 1u64, 600_000) {
        settings.server.send_timeout_ms = v;
    }
    if let Some(v) = env.ranged("RELAY_HEARTBEAT_INTERVAL_MS", 100u64, 600_000) {
        settings.server.heartbeat_interval_ms = v;
    }
    if let Some(v) = env.ranged("RELAY_HEARTBEAT_TIMEOUT_MS", 100u64, 3_600_000) {
        settings.server.heartbeat_timeout_ms = v;
    }

    // ── Image ───────────────────────────────────────────────────────
    if let Some(v) = env.ranged("RELAY_IMAGE_MAX_WIDTH", 1u32, 16_384) {
        settings.image.max_width = v;
    }
    if let Some(v) = env.ranged("RELAY_IMAGE_MAX_HEIGHT", 1u32, 16_384) {
        settings.image.max_height = v;
    }
    if let Some(v) = env.ranged("RELAY_JPEG_QUALITY", 1u8, 100) {
        settings.image.jpeg_quality = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("RELAY_LOG_LEVEL") {
        match parse_log_level(&v) {
            Some(level) => settings.logging.level = level,
            None => tracing::warn!(key = "RELAY_LOG_LEVEL", value = %v, "invalid log level, ignoring"),
        }
    }
}

/// Reject settings the server cannot run with.
pub fn validate(settings: &RelaySettings) -> Result<()> {
    let image = &settings.image;
    if image.max_width == 0 || image.max_height == 0 {
        return Err(SettingsError::InvalidValue(format!(
            "image bounds must be at least 1x1, got {}x{}",
            image.max_width, image.max_height
        )));
    }
    if !(1..=100).contains(&image.jpeg_quality) {
        return Err(SettingsError::InvalidValue(format!(
            "image.jpegQuality must be within 1-100, got {}",
            image.jpeg_quality
        )));
    }
    let server = &settings.server;
    if server.send_queue_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "server.sendQueueCapacity must be at least 1".into(),
        ));
    }
    if server.send_timeout_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "server.sendTimeoutMs must be positive".into(),
        ));
    }
    if server.heartbeat_interval_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "server.heartbeatIntervalMs must be positive".into(),
        ));
    }
    // A timeout within one ping interval drops every session at its first tick
    if server.heartbeat_timeout_ms <= server.heartbeat_interval_ms {
        return Err(SettingsError::InvalidValue(format!(
            "server.heartbeatTimeoutMs ({}) must exceed server.heartbeatIntervalMs ({})",
            server.heartbeat_timeout_ms, server.heartbeat_interval_ms
        )));
    }
    Ok(())
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a log level name (case-insensitive).
pub fn parse_log_level(val: &str) -> Option<LogLevel> {
    match val.to_lowercase().as_str() {
        "trace" => Some(LogLevel::Trace),
        "debug" => Some(LogLevel::Debug),
        "info" => Some(LogLevel::Info),
        "warn" | "warning" => Some(LogLevel::Warn),
        "error" => Some(LogLevel::Error),
        _ => None,
    }
}

/// Parse a string as a number within an inclusive range.
pub fn parse_in_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn ranged<T>(&self, name: &str, min: T, max: T) -> Option<T>
    where
        T: std::str::FromStr + PartialOrd,
    {
        let val = self.string(name)?;
        let result = parse_in_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid numeric env var, ignoring");
        }
        result
    }
}
