use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ControlError;

/// One complete set of control readings, as sent by the remote.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlSnapshot {
    #[serde(rename = "LeftStickX")]
    pub left_stick_x: f64,
    #[serde(rename = "LeftStickY")]
    pub left_stick_y: f64,
    #[serde(rename = "RightStickX")]
    pub right_stick_x: f64,
    #[serde(rename = "RightStickY")]
    pub right_stick_y: f64,
    #[serde(rename = "CH5State", deserialize_with = "truthy")]
    pub ch5_state: bool,
    #[serde(rename = "CH6State", deserialize_with = "truthy")]
    pub ch6_state: bool,
}

impl ControlSnapshot {
    /// Decode raw message bytes. Bytes that are not JSON at all give
    /// `DecodeFailure`; valid JSON of the wrong shape gives `MalformedSnapshot`.
    pub fn decode(bytes: &[u8]) -> Result<Self, ControlError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| ControlError::DecodeFailure(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ControlError> {
        serde_json::from_value(value).map_err(|e| ControlError::MalformedSnapshot(e.to_string()))
    }

    pub fn sticks(&self) -> [f64; 4] {
        [
            self.left_stick_x,
            self.left_stick_y,
            self.right_stick_x,
            self.right_stick_y,
        ]
    }
}

// Switch channels come from the remote as booleans, but some transmitters
// send 0/1 instead, and an unset switch may arrive as null.
fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Bool(b) => Ok(b),
        Value::Null => Ok(false),
        Value::Number(n) => Ok(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
        other => Err(serde::de::Error::custom(format!(
            "expected boolean, number or null, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"{"LeftStickX":1000,"LeftStickY":2000,"RightStickX":1500,"RightStickY":1500.5,"CH5State":false,"CH6State":true}"#;

    #[test]
    fn decodes_full_message() {
        let snap = ControlSnapshot::decode(FULL.as_bytes()).unwrap();
        assert_eq!(snap.left_stick_x, 1000.0);
        assert_eq!(snap.left_stick_y, 2000.0);
        assert_eq!(snap.right_stick_x, 1500.0);
        assert_eq!(snap.right_stick_y, 1500.5);
        assert!(!snap.ch5_state);
        assert!(snap.ch6_state);
    }

    #[test]
    fn numeric_switch_states_are_truthy() {
        let msg = r#"{"LeftStickX":1500,"LeftStickY":1500,"RightStickX":1500,"RightStickY":1500,"CH5State":1,"CH6State":0}"#;
        let snap = ControlSnapshot::decode(msg.as_bytes()).unwrap();
        assert!(snap.ch5_state);
        assert!(!snap.ch6_state);
    }

    #[test]
    fn null_switch_state_is_off() {
        let msg = r#"{"LeftStickX":1500,"LeftStickY":1500,"RightStickX":1500,"RightStickY":1500,"CH5State":true,"CH6State":null}"#;
        let snap = ControlSnapshot::decode(msg.as_bytes()).unwrap();
        assert!(snap.ch5_state);
        assert!(!snap.ch6_state);
    }

    #[test]
    fn out_of_domain_sticks_pass_through() {
        let msg = r#"{"LeftStickX":-40,"LeftStickY":99999,"RightStickX":1500,"RightStickY":1500,"CH5State":true,"CH6State":true}"#;
        let snap = ControlSnapshot::decode(msg.as_bytes()).unwrap();
        assert_eq!(snap.left_stick_x, -40.0);
        assert_eq!(snap.left_stick_y, 99999.0);
    }

    #[test]
    fn extra_fields_are_ignored() {
        let msg = r#"{"LeftStickX":1500,"LeftStickY":1500,"RightStickX":1500,"RightStickY":1500,"CH5State":true,"CH6State":true,"Battery":7.4}"#;
        assert!(ControlSnapshot::decode(msg.as_bytes()).is_ok());
    }

    #[test]
    fn missing_field_is_malformed() {
        let msg = r#"{"LeftStickX":1500,"LeftStickY":1500,"RightStickX":1500,"RightStickY":1500,"CH5State":true}"#;
        let err = ControlSnapshot::decode(msg.as_bytes()).unwrap_err();
        assert!(matches!(err, ControlError::MalformedSnapshot(ref m) if m.contains("CH6State")));
    }

    #[test]
    fn mistyped_field_is_malformed() {
        let msg = r#"{"LeftStickX":"left","LeftStickY":1500,"RightStickX":1500,"RightStickY":1500,"CH5State":true,"CH6State":true}"#;
        let err = ControlSnapshot::decode(msg.as_bytes()).unwrap_err();
        assert!(matches!(err, ControlError::MalformedSnapshot(_)));

        let msg = r#"{"LeftStickX":1500,"LeftStickY":1500,"RightStickX":1500,"RightStickY":1500,"CH5State":"on","CH6State":true}"#;
        let err = ControlSnapshot::decode(msg.as_bytes()).unwrap_err();
        assert!(matches!(err, ControlError::MalformedSnapshot(_)));
    }

    #[test]
    fn non_object_is_malformed() {
        let err = ControlSnapshot::decode(b"[1, 2, 3]").unwrap_err();
        assert!(matches!(err, ControlError::MalformedSnapshot(_)));
    }

    #[test]
    fn garbage_is_decode_failure() {
        let err = ControlSnapshot::decode(b"not json at all").unwrap_err();
        assert!(matches!(err, ControlError::DecodeFailure(_)));
        let err = ControlSnapshot::decode(&[0xff, 0xfe, 0x7b]).unwrap_err();
        assert!(matches!(err, ControlError::DecodeFailure(_)));
    }
}
