//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// Sessions accepted total (counter, labels: channel).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Sessions disconnected total (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Live sessions (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Session lifetime seconds (histogram).
pub const WS_SESSION_DURATION_SECONDS: &str = "ws_session_duration_seconds";
/// Inbound frames total (counter, labels: kind).
pub const WS_FRAMES_RECEIVED_TOTAL: &str = "ws_frames_received_total";
/// Broadcast operations total (counter, labels: kind).
pub const BROADCASTS_TOTAL: &str = "relay_broadcasts_total";
/// Successful per-recipient deliveries total (counter).
pub const DELIVERIES_TOTAL: &str = "relay_deliveries_total";
/// Failed per-recipient sends total (counter).
pub const SEND_FAILURES_TOTAL: &str = "relay_send_failures_total";
/// Unicast attempts total (counter, labels: outcome).
pub const UNICAST_TOTAL: &str = "relay_unicast_total";
/// Image frames processed total (counter, labels: outcome).
pub const IMAGES_PROCESSED_TOTAL: &str = "relay_images_processed_total";
/// Image transform duration seconds (histogram).
pub const IMAGE_TRANSFORM_DURATION_SECONDS: &str = "relay_image_transform_duration_seconds";
