//! Per-connection publish/subscribe table.
//!
//! Handlers are keyed by event name and fire in insertion order. The
//! table is snapshotted before firing, so handlers may freely add or
//! remove listeners (or send, or close) while being invoked.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::Error;
use crate::protocol::Envelope;

use super::Connection;

// ============================================================================
// Reserved Event Names
// ============================================================================

/// Fired after the transport opened.
pub const EVENT_OPEN: &str = "open";

/// Fired for transport and inbound protocol errors.
pub const EVENT_ERROR: &str = "error";

/// Fired after the transport closed.
pub const EVENT_CLOSE: &str = "close";

/// Fired for every inbound frame.
pub const EVENT_MESSAGE: &str = "message";

// ============================================================================
// Types
// ============================================================================

/// Event handler callback.
///
/// Receives the connection that fired and the event payload.
pub type Handler = Arc<dyn Fn(&Connection, &EventPayload) + Send + Sync>;

/// Identifies one subscription, for removal with `off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

// ============================================================================
// EventPayload
// ============================================================================

/// Data delivered with an event.
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// `open` and `close` carry nothing.
    None,

    /// Raw text frame.
    Text(String),

    /// `data` of a decoded envelope, for the named event.
    Data(Value),

    /// The whole decoded envelope, for `message`.
    Envelope(Envelope),

    /// Transport or protocol error, for `error`.
    Error(Arc<Error>),
}

impl EventPayload {
    /// Returns the raw text, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the envelope data, if any.
    #[must_use]
    pub fn as_data(&self) -> Option<&Value> {
        match self {
            Self::Data(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the envelope, if any.
    #[must_use]
    pub fn as_envelope(&self) -> Option<&Envelope> {
        match self {
            Self::Envelope(envelope) => Some(envelope),
            _ => None,
        }
    }

    /// Returns the error, if any.
    #[must_use]
    pub fn as_error(&self) -> Option<&Error> {
        match self {
            Self::Error(error) => Some(error),
            _ => None,
        }
    }
}

// ============================================================================
// Listeners
// ============================================================================

/// Event name to ordered handler list.
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: AtomicU64,
    table: Mutex<FxHashMap<String, Vec<(ListenerId, Handler)>>>,
}

impl Listeners {
    /// Appends a handler for `event`.
    pub(crate) fn add(&self, event: &str, handler: Handler) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.table
            .lock()
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Removes one handler. Returns `true` if it was present.
    pub(crate) fn remove(&self, event: &str, id: ListenerId) -> bool {
        let mut table = self.table.lock();
        let Some(handlers) = table.get_mut(event) else {
            return false;
        };

        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        let removed = handlers.len() != before;

        if handlers.is_empty() {
            table.remove(event);
        }
        removed
    }

    /// Removes every handler.
    pub(crate) fn clear(&self) {
        self.table.lock().clear();
    }

    /// Returns `true` if `event` has at least one handler.
    pub(crate) fn has(&self, event: &str) -> bool {
        self.table.lock().get(event).is_some_and(|h| !h.is_empty())
    }

    /// Returns the handlers for `event`, in insertion order.
    pub(crate) fn snapshot(&self, event: &str) -> Vec<Handler> {
        self.table
            .lock()
            .get(event)
            .map(|handlers| handlers.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.lock();
        let mut counts: Vec<_> = table.iter().map(|(k, v)| (k.clone(), v.len())).collect();
        counts.sort();
        f.debug_struct("Listeners").field("events", &counts).finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Handler {
        Arc::new(|_: &Connection, _: &EventPayload| {})
    }

    #[test]
    fn test_add_and_remove() {
        let listeners = Listeners::default();
        let first = listeners.add("tick", noop());
        let second = listeners.add("tick", noop());
        assert_ne!(first, second);
        assert_eq!(listeners.snapshot("tick").len(), 2);

        assert!(listeners.remove("tick", first));
        assert!(!listeners.remove("tick", first));
        assert_eq!(listeners.snapshot("tick").len(), 1);

        assert!(listeners.remove("tick", second));
        assert!(!listeners.has("tick"));
    }

    #[test]
    fn test_remove_unknown_event() {
        let listeners = Listeners::default();
        let id = listeners.add("a", noop());
        assert!(!listeners.remove("b", id));
        assert!(listeners.has("a"));
    }

    #[test]
    fn test_clear() {
        let listeners = Listeners::default();
        listeners.add("a", noop());
        listeners.add("b", noop());
        listeners.clear();
        assert!(!listeners.has("a"));
        assert!(listeners.snapshot("b").is_empty());
    }

    #[test]
    fn test_payload_accessors() {
        let text = EventPayload::Text("hi".to_string());
        assert_eq!(text.as_text(), Some("hi"));
        assert!(text.as_data().is_none());

        let error = EventPayload::Error(Arc::new(Error::protocol("bad")));
        assert!(error.as_error().is_some_and(Error::is_protocol_error));
        assert!(EventPayload::None.as_envelope().is_none());
    }
}
