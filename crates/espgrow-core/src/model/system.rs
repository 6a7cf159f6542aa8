// ── System telemetry and settings ──

use serde::{Deserialize, Serialize};
use strum::Display;

/// Controller health snapshot from `system_info`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemInfo {
    /// Seconds since boot.
    pub uptime: u64,
    pub free_heap: u64,
    pub chip_model: String,
    pub wifi_rssi: i32,
    pub ip_address: String,
    pub firmware_version: String,
}

/// Phase of a firmware update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OtaState {
    #[default]
    Idle,
    Uploading,
    Downloading,
    Installing,
    Success,
    Error,
    Rebooting,
    #[serde(other)]
    Unknown,
}

/// Firmware update progress from `ota_status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OtaStatus {
    pub status: OtaState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Controller-side settings from `settings`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSettings {
    /// Minutes east of UTC the controller uses for its local clock.
    pub timezone_offset_minutes: i32,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn system_info_tolerates_missing_fields() {
        let info: SystemInfo = serde_json::from_value(json!({
            "uptime": 3600, "freeHeap": 181_234, "chipModel": "ESP32-S3"
        }))
        .unwrap();
        assert_eq!(info.uptime, 3600);
        assert_eq!(info.chip_model, "ESP32-S3");
        assert!(info.firmware_version.is_empty());
    }

    #[test]
    fn ota_status_frame() {
        let status: OtaStatus = serde_json::from_value(json!({
            "type": "ota_status", "status": "downloading", "progress": 42
        }))
        .unwrap();
        assert_eq!(status.status, OtaState::Downloading);
        assert_eq!(status.progress, Some(42));
        assert_eq!(status.error, None);
    }
}
