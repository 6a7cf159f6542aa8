// ── Sensor domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use espgrow_api::TelemetryPoint;

/// Physical quantity a sensor measures.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SensorType {
    Temperature,
    Humidity,
    Co2,
    Light,
    Vpd,
    SoilMoisture,
    #[default]
    #[serde(other)]
    Other,
}

/// One measurement source as mirrored from the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sensor {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub sensor_type: SensorType,
    #[serde(default)]
    pub unit: String,
    /// Hardware driver, e.g. `sht4x`, `scd4x`, `as7341`, `calculated`.
    #[serde(default)]
    pub hardware_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Upstream temperature sensor for derived values (VPD).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_source_id: Option<String>,
    /// Upstream humidity sensor for derived values (VPD).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hum_source_id: Option<String>,
}

impl Sensor {
    pub fn is_derived(&self) -> bool {
        self.temp_source_id.is_some() || self.hum_source_id.is_some()
    }
}

/// Latest value for one sensor. Overwritten on every push.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub sensor_id: String,
    pub value: f64,
    /// When the push was processed.
    pub captured_at: DateTime<Utc>,
}

/// Time window of a history request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum HistoryRange {
    #[strum(to_string = "12h", serialize = "short")]
    Short,
    #[strum(to_string = "24h", serialize = "medium")]
    Medium,
    #[strum(to_string = "7d", serialize = "long")]
    Long,
}

impl HistoryRange {
    /// Value carried in `get_history` and `history` frames.
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Short => "12h",
            Self::Medium => "24h",
            Self::Long => "7d",
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "12h" => Some(Self::Short),
            "24h" => Some(Self::Medium),
            "7d" => Some(Self::Long),
            _ => None,
        }
    }
}

impl Serialize for HistoryRange {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire())
    }
}

/// One fetched history series. Replaced wholesale on every fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistorySeries {
    pub sensor_id: String,
    pub range: HistoryRange,
    pub points: Vec<TelemetryPoint>,
    pub fetched_at: DateTime<Utc>,
}

impl HistorySeries {
    pub fn latest(&self) -> Option<&TelemetryPoint> {
        self.points.last()
    }

    /// `(min, max)` of the series values.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        self.points.iter().fold(None, |acc, p| match acc {
            None => Some((p.value, p.value)),
            Some((lo, hi)) => Some((lo.min(p.value), hi.max(p.value))),
        })
    }
}

/// Controller-side PPFD correction for the spectral light sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PpfdCalibration {
    pub factor: f64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn derived_sensor_decodes_sources() {
        let sensor: Sensor = serde_json::from_value(json!({
            "id": "vpd_calc",
            "name": "VPD",
            "type": "vpd",
            "unit": "kPa",
            "hardwareType": "calculated",
            "tempSourceId": "sht4x_temp",
            "humSourceId": "sht4x_hum"
        }))
        .unwrap();

        assert_eq!(sensor.sensor_type, SensorType::Vpd);
        assert!(sensor.is_derived());
        assert_eq!(sensor.temp_source_id.as_deref(), Some("sht4x_temp"));
    }

    #[test]
    fn history_range_wire_values() {
        assert_eq!(HistoryRange::from_wire("7d"), Some(HistoryRange::Long));
        assert_eq!(HistoryRange::from_wire("1y"), None);
        assert_eq!(HistoryRange::Medium.to_string(), "24h");
        assert_eq!("short".parse::<HistoryRange>().unwrap(), HistoryRange::Short);
        assert_eq!("12h".parse::<HistoryRange>().unwrap(), HistoryRange::Short);
    }

    #[test]
    fn series_bounds() {
        let series = HistorySeries {
            sensor_id: "sht4x_temp".into(),
            range: HistoryRange::Short,
            points: vec![
                TelemetryPoint { timestamp: 1, value: 22.5 },
                TelemetryPoint { timestamp: 2, value: 19.0 },
                TelemetryPoint { timestamp: 3, value: 24.1 },
            ],
            fetched_at: Utc::now(),
        };
        assert_eq!(series.bounds(), Some((19.0, 24.1)));
        assert_eq!(series.latest().unwrap().timestamp, 3);
    }
}
