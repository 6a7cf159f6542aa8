//! JSON envelope codec.
//!
//! Every message on the channel is a JSON object `{ "type": "...", "data"?: ... }`.
//! Outbound commands omit `data` entirely when they carry no payload;
//! inbound frames without a string `type` are rejected here so the
//! channel can drop them in one place.

use serde_json::{Map, Value};

use crate::error::Error;

const TYPE_KEY: &str = "type";
const DATA_KEY: &str = "data";

// ── Outbound ─────────────────────────────────────────────────────────

/// Encode a command envelope.
///
/// `data` is attached under the `data` key only when it is present and
/// non-empty; `None`, `null` and `{}` all produce `{"type": kind}`.
pub fn encode(kind: &str, data: Option<&Value>) -> Result<String, Error> {
    let mut envelope = Map::with_capacity(2);
    envelope.insert(TYPE_KEY.into(), Value::String(kind.to_owned()));

    if let Some(data) = data.filter(|d| !is_empty_payload(d)) {
        envelope.insert(DATA_KEY.into(), data.clone());
    }

    Ok(serde_json::to_string(&Value::Object(envelope))?)
}

fn is_empty_payload(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

// ── Inbound ──────────────────────────────────────────────────────────

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFrame {
    /// Message type, e.g. `"devices"` or `"device_status"`.
    pub kind: String,

    /// The `data` field, if the frame carried one.
    pub data: Option<Value>,

    /// The full frame as received.
    raw: Value,
}

impl EventFrame {
    /// What subscribers receive: the `data` field when present,
    /// otherwise the whole frame (for pushes that put their fields at
    /// the top level, such as `device_status`).
    pub fn payload(&self) -> &Value {
        self.data.as_ref().unwrap_or(&self.raw)
    }

    /// The full frame as received.
    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

/// Decode one inbound text frame.
pub fn decode(text: &str) -> Result<EventFrame, Error> {
    let raw: Value = serde_json::from_str(text).map_err(|e| Error::Parse {
        message: e.to_string(),
    })?;

    let kind = raw
        .get(TYPE_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Parse {
            message: "frame has no string `type` field".into(),
        })?
        .to_owned();

    let data = raw.get(DATA_KEY).cloned();

    Ok(EventFrame { kind, data, raw })
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encode_without_data_omits_key() {
        let text = encode("get_devices", None).unwrap();
        assert_eq!(text, r#"{"type":"get_devices"}"#);
    }

    #[test]
    fn encode_with_empty_object_omits_key() {
        let text = encode("get_system_info", Some(&json!({}))).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert!(value.get("data").is_none());
    }

    #[test]
    fn encode_with_payload_nests_under_data() {
        let text = encode("remove_rule", Some(&json!({ "id": "rule_1" }))).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "remove_rule");
        assert_eq!(value["data"]["id"], "rule_1");
    }

    #[test]
    fn empty_command_decodes_back_without_data() {
        let text = encode("ping", Some(&json!({}))).unwrap();
        let frame = decode(&text).unwrap();
        assert_eq!(frame.kind, "ping");
        assert!(frame.data.is_none());
    }

    #[test]
    fn payload_prefers_data_field() {
        let frame = decode(r#"{"type":"devices","data":[{"id":"fan"}]}"#).unwrap();
        assert_eq!(frame.payload(), &json!([{ "id": "fan" }]));
    }

    #[test]
    fn payload_falls_back_to_whole_frame() {
        let frame =
            decode(r#"{"type":"device_status","deviceId":"fan","on":true,"success":true}"#)
                .unwrap();
        assert_eq!(frame.payload()["deviceId"], "fan");
        assert_eq!(frame.payload()["type"], "device_status");
    }

    #[test]
    fn rejects_invalid_json() {
        let err = decode("not json at all").unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn rejects_missing_or_non_string_type() {
        assert!(matches!(decode(r#"{"data":1}"#), Err(Error::Parse { .. })));
        assert!(matches!(decode(r#"{"type":42}"#), Err(Error::Parse { .. })));
        assert!(matches!(decode("[1,2,3]"), Err(Error::Parse { .. })));
    }
}
