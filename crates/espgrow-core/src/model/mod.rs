// ── Domain model ──
//
// Canonical mirrors of controller-side entities. Every type here is
// decoded from push frames with serde; `decode_collection` applies the
// element-level filtering shared by all bulk pushes.

pub mod device;
pub mod rule;
pub mod sensor;
pub mod system;

use serde::de::DeserializeOwned;
use serde_json::Value;

pub use device::{ControlMethod, ControlMode, Device, DeviceType};
pub use rule::{AutomationRule, ComparisonOperator, RuleAction, RuleKind};
pub use sensor::{HistoryRange, HistorySeries, PpfdCalibration, Sensor, SensorReading, SensorType};
pub use system::{ControllerSettings, OtaState, OtaStatus, SystemInfo};

/// Decode a pushed collection element by element.
///
/// Returns `None` when the payload is not an array at all. Elements
/// without a string `id` and `name`, or that fail to decode, are dropped
/// individually so one bad entry never discards the whole update.
pub(crate) fn decode_collection<T: DeserializeOwned>(payload: &Value, what: &str) -> Option<Vec<T>> {
    let Some(items) = payload.as_array() else {
        tracing::debug!(what, "push payload is not an array, ignoring");
        return None;
    };

    let decoded: Vec<T> = items
        .iter()
        .filter(|item| has_identity(item))
        .filter_map(|item| match T::deserialize(item) {
            Ok(entity) => Some(entity),
            Err(e) => {
                tracing::debug!(what, error = %e, "skipping malformed element");
                None
            }
        })
        .collect();

    let skipped = items.len() - decoded.len();
    if skipped > 0 {
        tracing::debug!(what, skipped, kept = decoded.len(), "filtered pushed collection");
    }
    Some(decoded)
}

fn has_identity(item: &Value) -> bool {
    item.get("id").is_some_and(Value::is_string) && item.get("name").is_some_and(Value::is_string)
}

/// Decode a single push payload, logging and discarding shape mismatches.
pub(crate) fn decode_payload<T: DeserializeOwned>(payload: &Value, what: &str) -> Option<T> {
    match T::deserialize(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(what, error = %e, "dropping push with unexpected shape");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn elements_without_identity_are_filtered() {
        let payload = json!([
            { "id": "fan_exhaust", "name": "Exhaust Fan", "type": "fan", "controlMethod": "relay", "gpioPin": 16 },
            { "id": "no_name" },
            { "name": "no id" },
            { "id": 7, "name": "numeric id" },
            { "id": "light_main", "name": "Grow Light", "type": "light" }
        ]);

        let devices: Vec<Device> = decode_collection(&payload, "devices").unwrap();
        let ids: Vec<&str> = devices.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["fan_exhaust", "light_main"]);
    }

    #[test]
    fn non_array_payload_is_ignored() {
        let none: Option<Vec<Device>> = decode_collection(&json!({ "id": "x" }), "devices");
        assert!(none.is_none());
    }

    #[test]
    fn shape_mismatch_is_dropped() {
        let status: Option<SystemInfo> = decode_payload(&json!("oops"), "system_info");
        assert!(status.is_none());
    }
}
