//! Binary history telemetry.
//!
//! The controller ships historical series as a packed little-endian array
//! of 8-byte records (`u32` unix seconds, `f32` value), base64-encoded
//! inside a JSON `history` frame.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Size of one packed record in bytes.
pub const POINT_SIZE: usize = 8;

/// One historical sample, value already rounded to display precision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPoint {
    /// Seconds since the unix epoch.
    pub timestamp: u32,
    /// Value rounded to one decimal place.
    pub value: f64,
}

/// Round a raw sample to the one-decimal display precision.
pub fn round_tenth(value: f32) -> f64 {
    (f64::from(value) * 10.0).round() / 10.0
}

/// Decode a packed telemetry buffer.
///
/// Total: a trailing partial record is ignored, and records with a zero
/// timestamp or a non-finite value are skipped.
pub fn decode_telemetry(bytes: &[u8]) -> Vec<TelemetryPoint> {
    bytes
        .chunks_exact(POINT_SIZE)
        .filter_map(|record| {
            let (ts, value) = record.split_at(4);
            let timestamp = u32::from_le_bytes(ts.try_into().ok()?);
            let value = f32::from_le_bytes(value.try_into().ok()?);

            (timestamp > 0 && value.is_finite()).then(|| TelemetryPoint {
                timestamp,
                value: round_tenth(value),
            })
        })
        .collect()
}

/// Decode a base64-encoded telemetry payload.
pub fn decode_telemetry_base64(encoded: &str) -> Result<Vec<TelemetryPoint>, Error> {
    let bytes = BASE64_STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::Telemetry(format!("invalid base64: {e}")))?;
    Ok(decode_telemetry(&bytes))
}

/// Pack points back into the wire layout.
#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
pub fn encode_telemetry(points: &[TelemetryPoint]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(points.len() * POINT_SIZE);
    for point in points {
        buf.extend_from_slice(&point.timestamp.to_le_bytes());
        buf.extend_from_slice(&(point.value as f32).to_le_bytes());
    }
    buf
}

/// Base64 form of [`encode_telemetry`], as carried in a `history` frame.
pub fn encode_telemetry_base64(points: &[TelemetryPoint]) -> String {
    BASE64_STANDARD.encode(encode_telemetry(points))
}
