// ── Command API ──
//
// Every client-to-controller message is a `Command` variant. Stores build
// commands and hand `kind()` / `data()` to the channel; nothing else
// constructs wire payloads by hand.

pub mod requests;

use serde::Serialize;
use serde_json::{Value, json};

use crate::model::{ControlMethod, HistoryRange};
use requests::{DeviceUpdate, NewDevice, NewRule, NewSensor, RuleUpdate, SensorUpdate};

/// All messages the client sends to a controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // ── Reads ────────────────────────────────────────────────────────
    Ping,
    GetSensors,
    GetDevices,
    GetRules,
    GetHistory { sensor_id: String, range: HistoryRange },
    GetPpfdCalibration,
    GetSettings,
    GetSystemInfo,

    // ── Device control ───────────────────────────────────────────────
    DeviceControl { method: ControlMethod, target: String, on: bool },

    // ── Rule CRUD ────────────────────────────────────────────────────
    AddRule(NewRule),
    UpdateRule { id: String, update: RuleUpdate },
    RemoveRule { id: String },
    ToggleRule { id: String },

    // ── Device CRUD ──────────────────────────────────────────────────
    AddDevice(NewDevice),
    UpdateDevice { id: String, update: DeviceUpdate },
    RemoveDevice { id: String },

    // ── Sensor CRUD ──────────────────────────────────────────────────
    AddSensor(NewSensor),
    UpdateSensor { id: String, update: SensorUpdate },
    RemoveSensor { id: String },

    // ── Calibration / settings ───────────────────────────────────────
    CalibratePpfd { known_ppfd: f64 },
    ResetPpfdCalibration,
    SetTimezone { offset_minutes: i32 },
}

/// `{"id": ..., <update fields>}` for update commands.
#[derive(Serialize)]
struct WithId<'a, T: Serialize> {
    id: &'a str,
    #[serde(flatten)]
    update: &'a T,
}

impl Command {
    /// Wire `type` of this command.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::GetSensors => "get_sensors",
            Self::GetDevices => "get_devices",
            Self::GetRules => "get_rules",
            Self::GetHistory { .. } => "get_history",
            Self::GetPpfdCalibration => "get_ppfd_calibration",
            Self::GetSettings => "get_settings",
            Self::GetSystemInfo => "get_system_info",
            Self::DeviceControl { .. } => "device_control",
            Self::AddRule(_) => "add_rule",
            Self::UpdateRule { .. } => "update_rule",
            Self::RemoveRule { .. } => "remove_rule",
            Self::ToggleRule { .. } => "toggle_rule",
            Self::AddDevice(_) => "add_device",
            Self::UpdateDevice { .. } => "update_device",
            Self::RemoveDevice { .. } => "remove_device",
            Self::AddSensor(_) => "add_sensor",
            Self::UpdateSensor { .. } => "update_sensor",
            Self::RemoveSensor { .. } => "remove_sensor",
            Self::CalibratePpfd { .. } => "calibrate_ppfd",
            Self::ResetPpfdCalibration => "reset_ppfd_calibration",
            Self::SetTimezone { .. } => "set_timezone",
        }
    }

    /// Payload placed under `data`, or `None` for bare requests.
    pub fn data(&self) -> Result<Option<Value>, serde_json::Error> {
        let value = match self {
            Self::Ping
            | Self::GetSensors
            | Self::GetDevices
            | Self::GetRules
            | Self::GetPpfdCalibration
            | Self::GetSettings
            | Self::GetSystemInfo
            | Self::ResetPpfdCalibration => return Ok(None),

            Self::GetHistory { sensor_id, range } => {
                json!({ "sensorId": sensor_id, "range": range.as_wire() })
            }
            Self::DeviceControl { method, target, on } => {
                json!({ "method": method, "target": target, "on": on })
            }

            Self::AddRule(rule) => serde_json::to_value(rule)?,
            Self::UpdateRule { id, update } => serde_json::to_value(WithId { id, update })?,
            Self::AddDevice(device) => serde_json::to_value(device)?,
            Self::UpdateDevice { id, update } => serde_json::to_value(WithId { id, update })?,
            Self::AddSensor(sensor) => serde_json::to_value(sensor)?,
            Self::UpdateSensor { id, update } => serde_json::to_value(WithId { id, update })?,

            Self::RemoveRule { id }
            | Self::ToggleRule { id }
            | Self::RemoveDevice { id }
            | Self::RemoveSensor { id } => json!({ "id": id }),

            Self::CalibratePpfd { known_ppfd } => json!({ "knownPpfd": known_ppfd }),
            Self::SetTimezone { offset_minutes } => json!({ "offsetMinutes": offset_minutes }),
        };
        Ok(Some(value))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{ComparisonOperator, DeviceType, RuleAction};
    use pretty_assertions::assert_eq;

    #[test]
    fn bare_requests_have_no_payload() {
        assert_eq!(Command::GetDevices.data().unwrap(), None);
        assert_eq!(Command::Ping.kind(), "ping");
    }

    #[test]
    fn device_control_payload() {
        let cmd = Command::DeviceControl {
            method: ControlMethod::ShellyGen2,
            target: "192.168.1.100".into(),
            on: true,
        };
        assert_eq!(
            cmd.data().unwrap().unwrap(),
            json!({ "method": "shelly_gen2", "target": "192.168.1.100", "on": true })
        );
    }

    #[test]
    fn history_request_uses_wire_range() {
        let cmd = Command::GetHistory {
            sensor_id: "scd4x_co2".into(),
            range: HistoryRange::Long,
        };
        assert_eq!(
            cmd.data().unwrap().unwrap(),
            json!({ "sensorId": "scd4x_co2", "range": "7d" })
        );
    }

    #[test]
    fn update_sends_only_set_fields() {
        let cmd = Command::UpdateDevice {
            id: "fan_exhaust".into(),
            update: DeviceUpdate {
                name: Some("Inline Fan".into()),
                ..DeviceUpdate::default()
            },
        };
        assert_eq!(
            cmd.data().unwrap().unwrap(),
            json!({ "id": "fan_exhaust", "name": "Inline Fan" })
        );
    }

    #[test]
    fn sensor_update_can_repoint_derived_sources() {
        let cmd = Command::UpdateSensor {
            id: "vpd_calc".into(),
            update: SensorUpdate {
                temp_source_id: Some("sht4x_temp".into()),
                hum_source_id: Some("sht4x_hum".into()),
                ..SensorUpdate::default()
            },
        };
        assert_eq!(cmd.kind(), "update_sensor");
        assert_eq!(
            cmd.data().unwrap().unwrap(),
            json!({ "id": "vpd_calc", "tempSourceId": "sht4x_temp", "humSourceId": "sht4x_hum" })
        );
    }

    #[test]
    fn add_device_uses_controller_field_names() {
        let cmd = Command::AddDevice(NewDevice {
            id: "dehum".into(),
            name: "Dehumidifier".into(),
            device_type: DeviceType::Dehumidifier,
            control_method: ControlMethod::Tasmota,
            ip_address: Some("192.168.1.103".into()),
            gpio_pin: None,
        });
        assert_eq!(
            cmd.data().unwrap().unwrap(),
            json!({
                "id": "dehum",
                "name": "Dehumidifier",
                "deviceType": "dehumidifier",
                "controlMethod": "tasmota",
                "ipAddress": "192.168.1.103"
            })
        );
    }

    #[test]
    fn add_rule_carries_rule_type() {
        let rule = NewRule::sensor(
            "r1",
            "Cool",
            "sht4x_temp",
            ComparisonOperator::GreaterThan,
            28.0,
            "fan_exhaust",
            RuleAction::TurnOn,
        );
        let data = Command::AddRule(rule).data().unwrap().unwrap();
        assert_eq!(data["ruleType"], "sensor");
        assert_eq!(data["operator"], ">");
        assert_eq!(data["threshold"], 28.0);
        assert!(data.get("onTime").is_none());
    }

    #[test]
    fn small_payloads() {
        assert_eq!(
            Command::SetTimezone { offset_minutes: -300 }.data().unwrap().unwrap(),
            json!({ "offsetMinutes": -300 })
        );
        assert_eq!(
            Command::CalibratePpfd { known_ppfd: 900.0 }.data().unwrap().unwrap(),
            json!({ "knownPpfd": 900.0 })
        );
        assert_eq!(
            Command::ToggleRule { id: "r1".into() }.data().unwrap().unwrap(),
            json!({ "id": "r1" })
        );
    }
}
