//! Communication modes and outgoing/incoming message shapes.
//!
//! A connection's [`Mode`] is fixed at construction and decides how
//! calls to `send` are framed and how inbound frames are dispatched.
//!
//! | Mode | Outgoing | Incoming |
//! |------|----------|----------|
//! | `TextOnly` | raw text | `message` with raw text |
//! | `EventOnly` | one envelope per event name | `<event>` + `message`, undecodable frames are errors |
//! | `Hybrid` | raw text or envelopes | envelopes as event-only, otherwise raw text |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

use super::Envelope;

// ============================================================================
// Mode
// ============================================================================

/// Dispatch strategy of a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Plain text frames only. Event messages send their names as text
    /// and drop the payload.
    #[serde(alias = "text")]
    TextOnly,

    /// `{event, data}` envelopes only.
    #[serde(alias = "event")]
    EventOnly,

    /// Plain text and envelopes.
    #[default]
    #[serde(alias = "both")]
    Hybrid,
}

impl Mode {
    /// Turns an outgoing message into the wire frames to send, in order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the message shape does not fit the mode.
    pub fn frames(self, message: Outgoing) -> Result<Vec<String>> {
        match (self, message) {
            (Self::TextOnly | Self::Hybrid, Outgoing::Text(text)) => Ok(vec![text]),
            (Self::TextOnly | Self::Hybrid, Outgoing::Value(_)) => {
                Err(Error::protocol("string expected"))
            }
            // Text-only has no envelope: each event name goes out as plain text
            (Self::TextOnly, Outgoing::Event { events, .. }) => Ok(events.into_iter().collect()),
            (Self::EventOnly, Outgoing::Text(event)) => {
                Ok(vec![Envelope::new(event, Value::Null).encode()?])
            }
            (Self::EventOnly, Outgoing::Value(_)) => Err(Error::protocol("event name expected")),
            (Self::EventOnly | Self::Hybrid, Outgoing::Event { events, data }) => events
                .into_iter()
                .map(|event| Envelope::new(event, data.clone()).encode())
                .collect(),
        }
    }

    /// Classifies an inbound frame.
    #[must_use]
    pub fn decode(self, frame: String) -> Inbound {
        if self == Self::TextOnly {
            return Inbound::Text(frame);
        }

        match Envelope::decode(&frame) {
            Ok(envelope) => Inbound::Envelope(envelope),
            Err(_) if self == Self::Hybrid => Inbound::Fallback(frame),
            Err(e) => Inbound::Invalid {
                frame,
                error: Error::protocol(format!("undecodable event frame: {e}")),
            },
        }
    }
}

// ============================================================================
// EventNames
// ============================================================================

/// One or more event names, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventNames(Vec<String>);

impl EventNames {
    /// Returns the number of names.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no names.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the names.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl IntoIterator for EventNames {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<&str> for EventNames {
    fn from(name: &str) -> Self {
        Self(vec![name.to_string()])
    }
}

impl From<String> for EventNames {
    fn from(name: String) -> Self {
        Self(vec![name])
    }
}

impl From<&String> for EventNames {
    fn from(name: &String) -> Self {
        Self(vec![name.clone()])
    }
}

impl From<Vec<String>> for EventNames {
    fn from(names: Vec<String>) -> Self {
        Self(names)
    }
}

impl From<Vec<&str>> for EventNames {
    fn from(names: Vec<&str>) -> Self {
        Self(names.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for EventNames {
    fn from(names: &[&str]) -> Self {
        Self(names.iter().map(|n| (*n).to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for EventNames {
    fn from(names: [&str; N]) -> Self {
        Self(names.iter().map(|n| (*n).to_string()).collect())
    }
}

// ============================================================================
// Outgoing
// ============================================================================

/// A message handed to `send`.
///
/// `Text` and `Value` are the single-argument forms; `Event` pairs one or
/// more event names with a payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    /// A plain string.
    Text(String),

    /// A lone non-string value. Rejected by every mode.
    Value(Value),

    /// Event name(s) with an associated payload.
    Event {
        /// Names to send, one frame each.
        events: EventNames,
        /// Payload carried by every frame.
        data: Value,
    },
}

impl Outgoing {
    /// Creates an event message.
    #[inline]
    #[must_use]
    pub fn event(events: impl Into<EventNames>, data: impl Into<Value>) -> Self {
        Self::Event {
            events: events.into(),
            data: data.into(),
        }
    }
}

impl From<&str> for Outgoing {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Outgoing {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Value> for Outgoing {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            other => Self::Value(other),
        }
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// An inbound frame after mode-specific decoding.
#[derive(Debug)]
pub enum Inbound {
    /// Text-only frame, delivered verbatim as `message`.
    Text(String),

    /// Decoded envelope.
    Envelope(Envelope),

    /// Hybrid frame that is not an envelope. The raw text doubles as the
    /// event name.
    Fallback(String),

    /// Event-only frame that is not an envelope.
    Invalid {
        /// The raw frame.
        frame: String,
        /// Why decoding failed.
        error: Error,
    },
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_mode_default_is_hybrid() {
        assert_eq!(Mode::default(), Mode::Hybrid);
    }

    #[test]
    fn test_mode_serde_names_and_aliases() {
        let mode: Mode = serde_json::from_str(r#""event-only""#).expect("parse");
        assert_eq!(mode, Mode::EventOnly);
        let mode: Mode = serde_json::from_str(r#""both""#).expect("parse");
        assert_eq!(mode, Mode::Hybrid);
        let mode: Mode = serde_json::from_str(r#""text""#).expect("parse");
        assert_eq!(mode, Mode::TextOnly);
        assert_eq!(
            serde_json::to_string(&Mode::TextOnly).expect("encode"),
            r#""text-only""#
        );
    }

    #[test]
    fn test_text_only_frames() {
        let frames = Mode::TextOnly.frames("hello".into()).expect("frames");
        assert_eq!(frames, vec!["hello".to_string()]);

        let err = Mode::TextOnly.frames(json!({"a": 1}).into()).unwrap_err();
        assert_eq!(err.to_string(), "Protocol error: string expected");

        let frames = Mode::TextOnly
            .frames(Outgoing::event(["shutdown", "now"], "ignored"))
            .expect("frames");
        assert_eq!(frames, vec!["shutdown".to_string(), "now".to_string()]);
    }

    #[test]
    fn test_event_only_one_frame_per_name() {
        let frames = Mode::EventOnly
            .frames(Outgoing::event(["a", "b"], json!({"k": 1})))
            .expect("frames");
        assert_eq!(
            frames,
            vec![
                r#"{"event":"a","data":{"k":1}}"#.to_string(),
                r#"{"event":"b","data":{"k":1}}"#.to_string(),
            ]
        );
    }

    #[test]
    fn test_event_only_single_name_without_data() {
        let frames = Mode::EventOnly.frames("shutdown".into()).expect("frames");
        assert_eq!(frames, vec![r#"{"event":"shutdown"}"#.to_string()]);
    }

    #[test]
    fn test_hybrid_frames() {
        let raw = Mode::Hybrid.frames("just text".into()).expect("frames");
        assert_eq!(raw, vec!["just text".to_string()]);

        let evented = Mode::Hybrid
            .frames(Outgoing::event("init", "hi"))
            .expect("frames");
        assert_eq!(evented, vec![r#"{"event":"init","data":"hi"}"#.to_string()]);

        assert!(Mode::Hybrid.frames(json!(3).into()).is_err());
    }

    #[test]
    fn test_json_string_is_text() {
        assert_eq!(
            Outgoing::from(json!("plain")),
            Outgoing::Text("plain".to_string())
        );
    }

    #[test]
    fn test_decode_text_only_skips_parsing() {
        let frame = r#"{"event":"x","data":1}"#.to_string();
        assert!(matches!(Mode::TextOnly.decode(frame.clone()), Inbound::Text(t) if t == frame));
    }

    #[test]
    fn test_decode_envelope() {
        let inbound = Mode::EventOnly.decode(r#"{"event":"stop","data":"now"}"#.to_string());
        match inbound {
            Inbound::Envelope(envelope) => {
                assert_eq!(envelope.event, "stop");
                assert_eq!(envelope.data, json!("now"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_decode_failure_by_mode() {
        assert!(matches!(
            Mode::Hybrid.decode("hello".to_string()),
            Inbound::Fallback(t) if t == "hello"
        ));
        assert!(matches!(
            Mode::EventOnly.decode("hello".to_string()),
            Inbound::Invalid { error, .. } if error.is_protocol_error()
        ));
    }

    #[test]
    fn test_event_names_conversions() {
        assert_eq!(EventNames::from("a").len(), 1);
        let names = EventNames::from(vec!["a", "b", "c"]);
        assert_eq!(names.iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert!(EventNames::from(Vec::<String>::new()).is_empty());
    }
}
