//! Event envelope wire format.
//!
//! Event-driven frames are single UTF-8 text frames carrying a JSON object:
//!
//! ```json
//! { "event": "greetings", "data": { "text": "hello" } }
//! ```
//!
//! One wire frame is exactly one application message; there is no
//! length-prefixing or reassembly.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Value, from_str, from_value, to_string};

use crate::error::{Error, Result};

// ============================================================================
// Envelope
// ============================================================================

/// The `{event, data}` wrapper used for event-driven frames.
///
/// A `null` payload is omitted on the wire and decodes back to `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name the receiver fires.
    pub event: String,

    /// Payload handed to the event's handlers.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl Envelope {
    /// Creates a new envelope.
    #[inline]
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Serializes the envelope into a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the payload cannot be encoded.
    pub fn encode(&self) -> Result<String> {
        Ok(to_string(self)?)
    }

    /// Parses a text frame as an envelope.
    ///
    /// Any frame that is not a JSON object with a string `event` field fails.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the frame is not JSON or lacks a string `event`
    /// - [`Error::Protocol`] if the frame is JSON but not an object
    pub fn decode(frame: &str) -> Result<Self> {
        match from_str::<Value>(frame)? {
            object @ Value::Object(_) => Ok(from_value(object)?),
            _ => Err(Error::protocol("envelope must be a JSON object")),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_encode_format() {
        let envelope = Envelope::new("init", json!("This is a simple text"));
        let frame = envelope.encode().expect("encode");
        assert_eq!(frame, r#"{"event":"init","data":"This is a simple text"}"#);
    }

    #[test]
    fn test_null_data_omitted() {
        let envelope = Envelope::new("ping", Value::Null);
        assert_eq!(envelope.encode().expect("encode"), r#"{"event":"ping"}"#);

        let decoded = Envelope::decode(r#"{"event":"ping"}"#).expect("decode");
        assert_eq!(decoded.data, Value::Null);
    }

    #[test]
    fn test_decode_structured_data() {
        let decoded =
            Envelope::decode(r#"{"event":"stop","data":{"cmd":"halt","msg":"bye"}}"#).expect("decode");
        assert_eq!(decoded.event, "stop");
        assert_eq!(decoded.data["cmd"], "halt");
        assert_eq!(decoded.data["msg"], "bye");
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let decoded = Envelope::decode(r#"{"event":"x","data":1,"id":7}"#).expect("decode");
        assert_eq!(decoded, Envelope::new("x", json!(1)));
    }

    #[test]
    fn test_decode_rejects_non_envelopes() {
        assert!(Envelope::decode("hello world").is_err());
        assert!(Envelope::decode("42").is_err());
        assert!(Envelope::decode(r#"{"data":"no event"}"#).is_err());
        assert!(Envelope::decode(r#"{"event":5,"data":"x"}"#).is_err());
        assert!(Envelope::decode(r#"["x", 1]"#).is_err());
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            ".*".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_envelope_survives_the_wire(event in ".*", data in arb_json()) {
            let envelope = Envelope::new(event, data);
            let frame = envelope.encode().expect("encode");
            prop_assert_eq!(Envelope::decode(&frame).expect("decode"), envelope);
        }
    }
}
