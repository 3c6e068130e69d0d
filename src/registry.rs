//! Address-keyed collection of live connections.
//!
//! The registry only groups connections: it never creates them and never
//! touches their transports directly. Fan-out operations work on a
//! snapshot of the map, so handlers and sends run without the registry
//! lock held.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │               Registry                  │
//! │  ┌─────────────────────────────────┐    │
//! │  │ ws://a:8888 → Connection a      │    │
//! │  │ ws://b:8888 → Connection b      │    │
//! │  │ ws://c:8888 → Connection c      │    │
//! │  └─────────────────────────────────┘    │
//! │   broadcast / multicast / listen        │
//! └─────────────────────────────────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::connection::{Connection, EventPayload, Handler};
use crate::protocol::{EventNames, Outgoing};

// ============================================================================
// Registry
// ============================================================================

/// Connections keyed by address.
///
/// A later registration under the same address replaces the earlier one.
///
/// # Example
///
/// ```ignore
/// let registry = Registry::global();
/// registry.register(&conn);
///
/// registry.listen("stop", |conn, payload| {
///     println!("{} stopped: {:?}", conn.address(), payload.as_data());
/// });
/// registry.broadcast("ping", None);
/// ```
#[derive(Debug, Default)]
pub struct Registry {
    /// Registered connections by address.
    connections: RwLock<FxHashMap<String, Connection>>,
}

// ============================================================================
// Registry - Constructors
// ============================================================================

impl Registry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide registry.
    #[must_use]
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }
}

// ============================================================================
// Registry - Membership
// ============================================================================

impl Registry {
    /// Adds `connection`, replacing any entry with the same address.
    ///
    /// Returns `false` (and does nothing) if the address is empty.
    pub fn register(&self, connection: &Connection) -> bool {
        let address = connection.address();
        if address.is_empty() {
            warn!("Refusing to register connection without address");
            return false;
        }

        let replaced = self
            .connections
            .write()
            .insert(address.to_string(), connection.clone())
            .is_some();

        debug!(address, replaced, "Connection registered");
        true
    }

    /// Registers every connection in `connections`.
    pub fn register_all<'a>(&self, connections: impl IntoIterator<Item = &'a Connection>) {
        for connection in connections {
            self.register(connection);
        }
    }

    /// Removes the entry for `connection`'s address.
    ///
    /// Returns `true` if an entry was removed.
    pub fn unregister(&self, connection: &Connection) -> bool {
        let removed = self
            .connections
            .write()
            .remove(connection.address())
            .is_some();

        if removed {
            debug!(address = connection.address(), "Connection unregistered");
        }
        removed
    }

    /// Unregisters every connection in `connections`.
    pub fn unregister_all<'a>(&self, connections: impl IntoIterator<Item = &'a Connection>) {
        for connection in connections {
            self.unregister(connection);
        }
    }

    /// Returns `true` if `connection`'s address is registered.
    #[must_use]
    pub fn contains(&self, connection: &Connection) -> bool {
        self.connections.read().contains_key(connection.address())
    }

    /// Returns the connection registered under `address`.
    #[must_use]
    pub fn get(&self, address: &str) -> Option<Connection> {
        self.connections.read().get(address).cloned()
    }

    /// Returns the number of registered connections.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Returns `true` if nothing is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Returns the registered addresses, sorted.
    #[must_use]
    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.connections.read().keys().cloned().collect();
        addresses.sort_unstable();
        addresses
    }
}

// ============================================================================
// Registry - Snapshots
// ============================================================================

impl Registry {
    /// Calls `f` for each connection, in address order.
    pub fn each<F>(&self, mut f: F)
    where
        F: FnMut(&Connection),
    {
        for connection in self.sorted_snapshot(&FxHashSet::default()) {
            f(&connection);
        }
    }

    /// Returns a copy of the map without the `excluded` addresses.
    ///
    /// The registry itself is not modified.
    #[must_use]
    pub fn get_except<'a>(
        &self,
        excluded: impl IntoIterator<Item = &'a Connection>,
    ) -> FxHashMap<String, Connection> {
        let excluded = excluded_addresses(excluded);
        self.connections
            .read()
            .iter()
            .filter(|(address, _)| !excluded.contains(address.as_str()))
            .map(|(address, connection)| (address.clone(), connection.clone()))
            .collect()
    }

    /// Connections not in `excluded`, sorted by address.
    fn sorted_snapshot(&self, excluded: &FxHashSet<String>) -> Vec<Connection> {
        let mut snapshot: Vec<Connection> = self
            .connections
            .read()
            .iter()
            .filter(|(address, _)| !excluded.contains(address.as_str()))
            .map(|(_, connection)| connection.clone())
            .collect();
        snapshot.sort_unstable_by(|a, b| a.address().cmp(b.address()));
        snapshot
    }
}

// ============================================================================
// Registry - Fan-out
// ============================================================================

impl Registry {
    /// Sends `event` to every ready connection.
    ///
    /// Returns the number of connections the message was handed to.
    pub fn broadcast(&self, event: &str, data: Option<Value>) -> usize {
        self.multicast(std::iter::empty(), event, data)
    }

    /// Sends `event` to every ready connection not in `excluded`.
    ///
    /// With `data`, each connection sends an event frame; without, it
    /// sends `event` as a plain message. `null`, `""` and `[]` count as
    /// no data. Per-connection failures are logged and skipped.
    pub fn multicast<'a>(
        &self,
        excluded: impl IntoIterator<Item = &'a Connection>,
        event: &str,
        data: Option<Value>,
    ) -> usize {
        let excluded = excluded_addresses(excluded);
        let data = data.filter(has_payload);
        let mut delivered = 0usize;

        for connection in self.sorted_snapshot(&excluded) {
            if !connection.is_ready() {
                continue;
            }

            let result = match &data {
                Some(data) => connection.send(Outgoing::event(event, data.clone())),
                None => connection.send(event),
            };

            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(address = connection.address(), event, error = %e, "Multicast send failed");
                }
            }
        }

        debug!(event, delivered, excluded = excluded.len(), "Multicast");
        delivered
    }

    /// Subscribes `handler` to `events` on every registered connection.
    ///
    /// Connections registered later are not subscribed.
    pub fn listen<F>(&self, events: impl Into<EventNames>, handler: F) -> usize
    where
        F: Fn(&Connection, &EventPayload) + Send + Sync + 'static,
    {
        self.listen_except(events, std::iter::empty(), handler)
    }

    /// Subscribes `handler` to `events` on every registered connection
    /// not in `excluded`.
    ///
    /// Returns the number of connections subscribed.
    pub fn listen_except<'a, F>(
        &self,
        events: impl Into<EventNames>,
        excluded: impl IntoIterator<Item = &'a Connection>,
        handler: F,
    ) -> usize
    where
        F: Fn(&Connection, &EventPayload) + Send + Sync + 'static,
    {
        let events = events.into();
        let handler: Handler = Arc::new(handler);
        let targets = self.sorted_snapshot(&excluded_addresses(excluded));

        for connection in &targets {
            for event in events.iter() {
                connection.add_listener(event, Arc::clone(&handler));
            }
        }

        debug!(events = events.len(), connections = targets.len(), "Listener fanned out");
        targets.len()
    }

    /// Closes every connection and empties the registry.
    pub fn close_all(&self) {
        let drained: Vec<Connection> = self
            .connections
            .write()
            .drain()
            .map(|(_, connection)| connection)
            .collect();

        for connection in &drained {
            connection.close();
        }

        info!(closed = drained.len(), "All connections closed");
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn has_payload(data: &Value) -> bool {
    match data {
        Value::Null => false,
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

fn excluded_addresses<'a>(excluded: impl IntoIterator<Item = &'a Connection>) -> FxHashSet<String> {
    excluded
        .into_iter()
        .map(|connection| connection.address().to_string())
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;
    use proptest::prelude::*;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use crate::protocol::Mode;
    use crate::transport::{MemoryConnector, MemorySession};

    fn connection(address: &str, mode: Mode) -> (Connection, MemorySession) {
        let connector = MemoryConnector::new();
        let conn = assert_ok!(
            Connection::builder(address)
                .mode(mode)
                .connector(connector.clone())
                .build()
        );
        let session = connector.latest().expect("session");
        (conn, session)
    }

    fn open(address: &str) -> (Connection, MemorySession) {
        let (conn, session) = connection(address, Mode::EventOnly);
        session.open();
        (conn, session)
    }

    #[test]
    fn test_register_and_unregister() {
        let registry = Registry::new();
        let (a, _) = connection("mem://a", Mode::Hybrid);

        assert!(registry.register(&a));
        assert!(registry.contains(&a));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("mem://a").is_some_and(|c| c.ptr_eq(&a)));

        assert!(registry.unregister(&a));
        assert!(!registry.unregister(&a));
        assert!(!registry.contains(&a));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_same_address_overwrites() {
        let registry = Registry::new();
        let (first, _) = connection("mem://a", Mode::Hybrid);
        let (second, _) = connection("mem://a", Mode::Hybrid);

        registry.register_all([&first, &second]);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("mem://a").is_some_and(|c| c.ptr_eq(&second)));
    }

    #[test]
    fn test_each_in_address_order() {
        let registry = Registry::new();
        let (c, _) = connection("mem://c", Mode::Hybrid);
        let (a, _) = connection("mem://a", Mode::Hybrid);
        let (b, _) = connection("mem://b", Mode::Hybrid);
        registry.register_all([&c, &a, &b]);

        let mut seen = Vec::new();
        registry.each(|conn| seen.push(conn.address().to_string()));
        assert_eq!(seen, vec!["mem://a", "mem://b", "mem://c"]);
        assert_eq!(registry.addresses(), seen);
    }

    #[test]
    fn test_get_except_leaves_registry_untouched() {
        let registry = Registry::new();
        let (a, _) = connection("mem://a", Mode::Hybrid);
        let (b, _) = connection("mem://b", Mode::Hybrid);
        registry.register_all([&a, &b]);

        let rest = registry.get_except([&a]);
        assert_eq!(rest.len(), 1);
        assert!(rest.contains_key("mem://b"));
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(&a));
    }

    #[test]
    fn test_broadcast_reaches_ready_connections() {
        let registry = Registry::new();
        let (a, session_a) = open("mem://a");
        let (b, session_b) = open("mem://b");
        let (idle, session_idle) = connection("mem://idle", Mode::EventOnly);
        registry.register_all([&a, &b, &idle]);

        let delivered = registry.broadcast("ping", Some(json!({"n": 1})));
        assert_eq!(delivered, 2);

        let expected = vec![r#"{"event":"ping","data":{"n":1}}"#.to_string()];
        assert_eq!(session_a.sent(), expected);
        assert_eq!(session_b.sent(), expected);
        assert!(session_idle.sent().is_empty());
    }

    #[test]
    fn test_broadcast_without_data() {
        let registry = Registry::new();
        let (a, session) = open("mem://a");
        registry.register(&a);

        assert_eq!(registry.broadcast("ping", None), 1);
        assert_eq!(session.sent(), vec![r#"{"event":"ping"}"#.to_string()]);
    }

    #[test]
    fn test_multicast_excludes_by_address() {
        let registry = Registry::new();
        let (a, session_a) = open("mem://a");
        let (b, session_b) = open("mem://b");
        registry.register_all([&a, &b]);

        // A different handle with the same address is still excluded
        let (a_again, _) = connection("mem://a", Mode::EventOnly);
        let delivered = registry.multicast([&a_again], "stop", Some(json!("bye")));

        assert_eq!(delivered, 1);
        assert!(session_a.sent().is_empty());
        assert_eq!(
            session_b.sent(),
            vec![r#"{"event":"stop","data":"bye"}"#.to_string()]
        );
    }

    #[test]
    fn test_broadcast_to_text_only_sends_event_name() {
        let registry = Registry::new();
        let (text, text_session) = connection("mem://text", Mode::TextOnly);
        text_session.open();
        registry.register(&text);

        assert_eq!(registry.broadcast("shutdown", Some(json!("bye"))), 1);
        assert_eq!(text_session.sent(), vec!["shutdown".to_string()]);
    }

    #[test]
    fn test_multicast_skips_failing_connections() {
        let registry = Registry::new();
        let (broken, broken_session) = open("mem://broken");
        let (healthy, healthy_session) = open("mem://healthy");
        registry.register_all([&broken, &healthy]);

        broken_session.set_send_failing(true);
        assert_err!(broken.send_event("x", 1));

        assert_eq!(registry.broadcast("x", Some(json!(1))), 1);
        assert!(broken_session.sent().is_empty());
        assert_eq!(healthy_session.sent().len(), 1);
    }

    #[test]
    fn test_empty_data_sends_plain_event() {
        let registry = Registry::new();
        let (a, session) = open("mem://a");
        registry.register(&a);

        for empty in [Value::Null, json!(""), json!([])] {
            assert_eq!(registry.broadcast("ping", Some(empty)), 1);
        }
        assert_eq!(registry.broadcast("ping", Some(json!(0))), 1);

        assert_eq!(
            session.sent(),
            vec![
                r#"{"event":"ping"}"#.to_string(),
                r#"{"event":"ping"}"#.to_string(),
                r#"{"event":"ping"}"#.to_string(),
                r#"{"event":"ping","data":0}"#.to_string(),
            ]
        );
    }

    #[test]
    fn test_listen_applies_to_current_connections_only() {
        let registry = Registry::new();
        let (a, session_a) = open("mem://a");
        let (b, session_b) = open("mem://b");
        registry.register(&a);

        let hits = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&hits);
        let subscribed = registry.listen(["stop", "pause"], move |conn, _| {
            sink.lock().push(conn.address().to_string());
        });
        assert_eq!(subscribed, 1);

        registry.register(&b);
        session_a.deliver(r#"{"event":"stop"}"#);
        session_a.deliver(r#"{"event":"pause"}"#);
        session_b.deliver(r#"{"event":"stop"}"#);

        assert_eq!(*hits.lock(), vec!["mem://a", "mem://a"]);
    }

    #[test]
    fn test_listen_except() {
        let registry = Registry::new();
        let (a, session_a) = open("mem://a");
        let (b, session_b) = open("mem://b");
        registry.register_all([&a, &b]);

        let hits = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&hits);
        registry.listen_except("tick", [&a], move |_, _| *sink.lock() += 1);

        session_a.deliver(r#"{"event":"tick"}"#);
        session_b.deliver(r#"{"event":"tick"}"#);
        assert_eq!(*hits.lock(), 1);
        assert!(!a.has_listeners("tick"));
    }

    #[test]
    fn test_close_all() {
        let registry = Registry::new();
        let (a, session_a) = open("mem://a");
        let (b, session_b) = open("mem://b");
        registry.register_all([&a, &b]);

        registry.close_all();

        assert!(registry.is_empty());
        assert!(session_a.close_requested());
        assert!(session_b.close_requested());
        assert!(!a.auto_reconnect());
    }

    #[test]
    fn test_global_is_shared() {
        assert!(std::ptr::eq(Registry::global(), Registry::global()));
    }

    proptest! {
        #[test]
        fn test_membership_follows_last_operation(
            ops in proptest::collection::vec((0usize..4, any::<bool>()), 0..32)
        ) {
            let registry = Registry::new();
            let conns: Vec<Connection> = (0..4)
                .map(|i| connection(&format!("mem://{i}"), Mode::Hybrid).0)
                .collect();
            let mut expected = [false; 4];

            for (index, add) in ops {
                if add {
                    registry.register(&conns[index]);
                } else {
                    registry.unregister(&conns[index]);
                }
                expected[index] = add;
            }

            for (conn, present) in conns.iter().zip(expected) {
                prop_assert_eq!(registry.contains(conn), present);
            }
            prop_assert_eq!(registry.len(), expected.iter().filter(|p| **p).count());
        }
    }
}
