// ── Automation rule domain types ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Whether a rule reacts to a sensor or to the clock.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RuleKind {
    /// Threshold on a sensor value. Rules stored before schedules existed
    /// carry no kind and are sensor rules.
    #[default]
    Sensor,
    Schedule,
}

/// Comparison applied to a sensor value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum ComparisonOperator {
    #[serde(rename = ">")]
    #[strum(serialize = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    #[strum(serialize = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<")]
    #[strum(serialize = "<")]
    LessThan,
    #[serde(rename = "<=")]
    #[strum(serialize = "<=")]
    LessOrEqual,
    #[serde(rename = "=", alias = "==")]
    #[strum(to_string = "=", serialize = "==")]
    Equal,
}

impl ComparisonOperator {
    pub fn evaluate(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::GreaterOrEqual => value >= threshold,
            Self::LessThan => value < threshold,
            Self::LessOrEqual => value <= threshold,
            Self::Equal => (value - threshold).abs() < f64::EPSILON,
        }
    }
}

/// What the rule does to its device when it fires.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RuleAction {
    #[default]
    TurnOn,
    TurnOff,
}

/// One automation rule as mirrored from the controller.
///
/// `on_time` / `off_time` hold local wall-clock `HH:MM`; the rule store
/// converts from the controller's UTC on ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(rename = "type", default)]
    pub kind: RuleKind,

    // Sensor rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<ComparisonOperator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_off: Option<f64>,
    #[serde(default)]
    pub use_hysteresis: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_run_time_ms: Option<u64>,

    // Schedule rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub off_time: Option<String>,

    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub action: RuleAction,
}

impl AutomationRule {
    /// Short human description of the trigger, e.g. `sht4x_temp > 28`
    /// or `08:00-20:00`.
    pub fn trigger_summary(&self) -> String {
        match self.kind {
            RuleKind::Schedule => format!(
                "{}-{}",
                self.on_time.as_deref().unwrap_or("--:--"),
                self.off_time.as_deref().unwrap_or("--:--")
            ),
            RuleKind::Sensor => {
                let sensor = self.sensor_id.as_deref().unwrap_or("?");
                let op = self.operator.map_or_else(|| "?".to_owned(), |o| o.to_string());
                let threshold = self.threshold.map_or_else(|| "?".to_owned(), |t| t.to_string());
                match (self.use_hysteresis, self.threshold_off) {
                    (true, Some(off)) => format!("{sensor} {op} {threshold} (off {off})"),
                    _ => format!("{sensor} {op} {threshold}"),
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_sensor_rule_with_hysteresis() {
        let rule: AutomationRule = serde_json::from_value(json!({
            "id": "rule_temp_fan",
            "name": "Cool when hot",
            "enabled": true,
            "type": "sensor",
            "sensorId": "sht4x_temp",
            "operator": ">",
            "threshold": 28,
            "thresholdOff": 26,
            "useHysteresis": true,
            "minRunTimeMs": 60000,
            "deviceId": "fan_exhaust",
            "action": "turn_on"
        }))
        .unwrap();

        assert_eq!(rule.kind, RuleKind::Sensor);
        assert_eq!(rule.operator, Some(ComparisonOperator::GreaterThan));
        assert_eq!(rule.min_run_time_ms, Some(60_000));
        assert_eq!(rule.trigger_summary(), "sht4x_temp > 28 (off 26)");
    }

    #[test]
    fn rule_without_kind_is_a_sensor_rule() {
        let rule: AutomationRule = serde_json::from_value(json!({
            "id": "r", "name": "R", "sensorId": "s", "operator": "<", "threshold": 50,
            "deviceId": "humidifier", "action": "turn_on"
        }))
        .unwrap();
        assert_eq!(rule.kind, RuleKind::Sensor);
        assert!(!rule.enabled);
    }

    #[test]
    fn schedule_summary() {
        let rule: AutomationRule = serde_json::from_value(json!({
            "id": "lights", "name": "Lights", "type": "schedule",
            "onTime": "06:00", "offTime": "00:00", "deviceId": "light_main", "action": "turn_on"
        }))
        .unwrap();
        assert_eq!(rule.trigger_summary(), "06:00-00:00");
    }

    #[test]
    fn operators() {
        assert!(ComparisonOperator::GreaterOrEqual.evaluate(28.0, 28.0));
        assert!(!ComparisonOperator::LessThan.evaluate(50.0, 50.0));
        assert_eq!("<=".parse::<ComparisonOperator>().unwrap(), ComparisonOperator::LessOrEqual);
        assert_eq!("==".parse::<ComparisonOperator>().unwrap(), ComparisonOperator::Equal);
        assert_eq!(ComparisonOperator::Equal.to_string(), "=");
    }
}
