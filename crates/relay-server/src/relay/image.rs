//! Image relay: downscale, re-encode as JPEG, broadcast to image sessions.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use metrics::{counter, histogram};
use relay_core::{Frame, RelayError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::broadcast::BroadcastDispatcher;
use crate::metrics::{IMAGE_TRANSFORM_DURATION_SECONDS, IMAGES_PROCESSED_TOTAL};

/// Default JPEG quality for relayed frames.
pub const DEFAULT_JPEG_QUALITY: u8 = 75;

/// Bounding box relayed images are fitted into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageBounds {
    /// Maximum output width.
    pub max_width: u32,
    /// Maximum output height.
    pub max_height: u32,
}

impl Default for ImageBounds {
    fn default() -> Self {
        Self {
            max_width: 800,
            max_height: 600,
        }
    }
}

/// Output dimensions for a `width × height` image fitted into `bounds`.
///
/// Images already inside the box keep their size. Otherwise the limiting
/// side is clamped to the box and the other side is rounded (floor or
/// ceiling) to whichever keeps the aspect ratio closest to the source image.
/// Neither side drops below 1.
pub fn fit_within(width: u32, height: u32, bounds: ImageBounds) -> (u32, u32) {
    let max_w = bounds.max_width.max(1);
    let max_h = bounds.max_height.max(1);
    if width == 0 || height == 0 || (width <= max_w && height <= max_h) {
        return (width, height);
    }

    let aspect = f64::from(width) / f64::from(height);
    let (box_w, box_h) = (f64::from(max_w), f64::from(max_h));
    if box_w / box_h >= aspect {
        let w = closest_side(box_h * aspect, |n| (aspect - n / box_h).abs());
        (w.min(max_w), max_h)
    } else {
        let h = closest_side(box_w / aspect, |n| {
            if n < 1.0 { 0.0 } else { (aspect - box_w / n).abs() }
        });
        (max_w, h.min(max_h))
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn closest_side(exact: f64, error: impl Fn(f64) -> f64) -> u32 {
    let (floor, ceil) = (exact.floor(), exact.ceil());
    // ties keep the floor
    let best = if error(ceil) < error(floor) { ceil } else { floor };
    (best as u32).max(1)
}

/// Decode `data`, fit it into `bounds`, and re-encode as RGB JPEG.
///
/// CPU-bound; call from a blocking context.
pub fn transcode(data: &[u8], bounds: ImageBounds, quality: u8) -> Result<Bytes, RelayError> {
    let decoded =
        image::load_from_memory(data).map_err(|e| RelayError::DecodeFailure(e.to_string()))?;

    let (width, height) = fit_within(decoded.width(), decoded.height(), bounds);
    let resized = if (width, height) == (decoded.width(), decoded.height()) {
        decoded
    } else {
        decoded.resize_exact(width, height, FilterType::CatmullRom)
    };

    let rgb = resized.to_rgb8();
    let mut out = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)))
        .map_err(|e| RelayError::EncodeFailure(e.to_string()))?;
    Ok(Bytes::from(out))
}

/// Transforms inbound image frames and broadcasts the result.
pub struct ImageRelay {
    bounds: ImageBounds,
    quality: u8,
    dispatcher: Arc<BroadcastDispatcher>,
}

impl ImageRelay {
    /// Create a relay that fits frames into `bounds` at JPEG `quality`.
    pub fn new(bounds: ImageBounds, quality: u8, dispatcher: Arc<BroadcastDispatcher>) -> Self {
        Self {
            bounds,
            quality,
            dispatcher,
        }
    }

    /// Bounding box in use.
    pub fn bounds(&self) -> ImageBounds {
        self.bounds
    }

    /// Transform `data` and broadcast it to every image session, the
    /// sender included. Returns the number of recipients reached.
    ///
    /// Undecodable input fails with [`RelayError::DecodeFailure`] and
    /// nothing is sent.
    pub async fn relay(&self, data: Bytes) -> Result<usize, RelayError> {
        let (bounds, quality) = (self.bounds, self.quality);
        let input_len = data.len();
        let started = Instant::now();

        let encoded = tokio::task::spawn_blocking(move || transcode(&data, bounds, quality))
            .await
            .map_err(|e| RelayError::EncodeFailure(format!("image worker failed: {e}")))?;
        histogram!(IMAGE_TRANSFORM_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        let encoded = match encoded {
            Ok(encoded) => encoded,
            Err(e) => {
                counter!(IMAGES_PROCESSED_TOTAL, "outcome" => e.code().as_str()).increment(1);
                return Err(e);
            }
        };
        counter!(IMAGES_PROCESSED_TOTAL, "outcome" => "ok").increment(1);
        debug!(input_len, output_len = encoded.len(), "image transformed");

        Ok(self.dispatcher.broadcast(Frame::Binary(encoded), None).await)
    }

    /// Broadcast `data` to every image session unchanged.
    pub async fn inject(&self, data: Bytes) -> usize {
        self.dispatcher.broadcast(Frame::Binary(data), None).await
    }
}
