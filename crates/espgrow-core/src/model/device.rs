// ── Device domain types ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Kind of actuator. Unknown kinds from newer firmware map to `Other`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceType {
    Fan,
    Light,
    Heater,
    Pump,
    Humidifier,
    Dehumidifier,
    #[default]
    #[serde(other)]
    Other,
}

/// How the controller drives the device.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ControlMethod {
    /// On-board relay on a GPIO pin.
    #[default]
    Relay,
    #[serde(alias = "shelly")]
    #[strum(to_string = "shelly_gen1", serialize = "shelly")]
    ShellyGen1,
    ShellyGen2,
    Tasmota,
    #[serde(other)]
    Other,
}

impl ControlMethod {
    /// Whether the device is addressed by IP rather than GPIO pin.
    pub fn is_networked(self) -> bool {
        matches!(self, Self::ShellyGen1 | Self::ShellyGen2 | Self::Tasmota)
    }
}

/// Who is currently driving the device.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ControlMode {
    #[default]
    Manual,
    Automatic,
}

/// One controllable actuator as mirrored from the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub device_type: DeviceType,
    #[serde(default)]
    pub control_method: ControlMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpio_pin: Option<u32>,
    #[serde(default)]
    pub is_on: bool,
    #[serde(default)]
    pub control_mode: ControlMode,
}

impl Device {
    /// Address the controller uses in `device_control`: the IP address,
    /// or the GPIO pin number for relays.
    pub fn target(&self) -> Option<String> {
        match (&self.ip_address, self.gpio_pin) {
            (Some(ip), _) if !ip.is_empty() => Some(ip.clone()),
            (_, Some(pin)) => Some(pin.to_string()),
            _ => None,
        }
    }
}
