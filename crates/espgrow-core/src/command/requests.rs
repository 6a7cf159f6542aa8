// ── Typed request structs for Command payloads ──
//
// Each struct lists exactly the fields a mutation may carry. Update
// structs are all-optional; unset fields are never put on the wire.

use serde::{Deserialize, Serialize};

use crate::model::{ComparisonOperator, ControlMethod, DeviceType, RuleAction, RuleKind, SensorType};

// ── Devices ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDevice {
    pub id: String,
    pub name: String,
    pub device_type: DeviceType,
    pub control_method: ControlMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpio_pin: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<DeviceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_method: Option<ControlMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpio_pin: Option<u32>,
}

// ── Sensors ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSensor {
    pub id: String,
    pub name: String,
    pub sensor_type: SensorType,
    pub unit: String,
    pub hardware_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hum_source_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_type: Option<SensorType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hardware_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hum_source_id: Option<String>,
}

// ── Rules ──────────────────────────────────────────────────────────

/// A new automation rule. Schedule times are local `HH:MM`; the rule
/// store converts them to UTC before sending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRule {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    #[serde(rename = "ruleType")]
    pub kind: RuleKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<ComparisonOperator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_off: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_hysteresis: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_run_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub off_time: Option<String>,
    pub device_id: String,
    pub action: RuleAction,
}

impl NewRule {
    /// Sensor-threshold rule.
    pub fn sensor(
        id: impl Into<String>,
        name: impl Into<String>,
        sensor_id: impl Into<String>,
        operator: ComparisonOperator,
        threshold: f64,
        device_id: impl Into<String>,
        action: RuleAction,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            kind: RuleKind::Sensor,
            sensor_id: Some(sensor_id.into()),
            operator: Some(operator),
            threshold: Some(threshold),
            threshold_off: None,
            use_hysteresis: None,
            min_run_time_ms: None,
            on_time: None,
            off_time: None,
            device_id: device_id.into(),
            action,
        }
    }

    /// Daily schedule rule with local on/off times.
    pub fn schedule(
        id: impl Into<String>,
        name: impl Into<String>,
        on_time: impl Into<String>,
        off_time: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            kind: RuleKind::Schedule,
            sensor_id: None,
            operator: None,
            threshold: None,
            threshold_off: None,
            use_hysteresis: None,
            min_run_time_ms: None,
            on_time: Some(on_time.into()),
            off_time: Some(off_time.into()),
            device_id: device_id.into(),
            action: RuleAction::TurnOn,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(rename = "ruleType", skip_serializing_if = "Option::is_none")]
    pub kind: Option<RuleKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<ComparisonOperator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_off: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_hysteresis: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_run_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub off_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<RuleAction>,
}
