//! Connection lifecycle and send/receive protocol.
//!
//! A [`Connection`] owns one transport at a time and layers the message
//! protocol on top of it:
//!
//! - **Lifecycle**: `open` / `close`, auto-reconnect after unexpected closes
//! - **Safe-send**: frames go straight out when open, are queued when
//!   `keep_unsent_messages` is set, and are dropped otherwise
//! - **Dispatch**: inbound frames fire named events and `message` per [`Mode`]
//!
//! # Reconnect
//!
//! ```text
//!            unexpected close, auto_reconnect
//!   ┌──────┐ ─────────────────────────────────► ┌───────┐
//!   │ idle │                                    │ armed │──┐ tick: reconnect
//!   └──────┘ ◄───────────────────────────────── └───────┘◄─┘ if closed
//!              open succeeded, or close()
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{EventNames, Inbound, Mode, Outgoing};
use crate::transport::handle::EventSink;
use crate::transport::{
    ConnectRequest, Connector, ReadyState, TransportEvents, TransportHandle,
};

use super::builder::ConnectionBuilder;
use super::config::millis_saturating;
use super::listeners::{
    EVENT_CLOSE, EVENT_ERROR, EVENT_MESSAGE, EVENT_OPEN, EventPayload, Handler, ListenerId,
    Listeners,
};
use super::reconnect::ReconnectTimer;

// ============================================================================
// Connection
// ============================================================================

/// Event-driven client connection with auto-reconnect.
///
/// Cheap to clone; clones share the same underlying connection.
///
/// # Example
///
/// ```ignore
/// use wsrelay::Connection;
///
/// let conn = Connection::builder("ws://localhost:8888")
///     .on("open", |conn, _| {
///         let _ = conn.send("This is a simple text");
///     })
///     .on("message", |_, payload| println!("{payload:?}"))
///     .build()?;
///
/// conn.on("stop", |_, payload| println!("stop: {:?}", payload.as_data()));
/// ```
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

/// State shared by all clones of a connection.
pub(crate) struct Inner {
    /// Registry key, stable for the connection's lifetime.
    address: String,
    /// Sub-protocol, immutable.
    protocol: Option<String>,
    /// Dispatch strategy, immutable.
    mode: Mode,
    /// Reconnect polling period.
    reconnect_interval: Duration,
    /// Creates transports.
    connector: Arc<dyn Connector>,
    /// Event handlers.
    listeners: Listeners,
    /// Mutable lifecycle state.
    state: Mutex<LinkState>,
}

/// Mutable lifecycle state.
struct LinkState {
    /// Current transport, if one was ever created.
    transport: Option<Box<dyn TransportHandle>>,
    /// Generation of the current transport.
    generation: u64,
    /// Live auto-reconnect flag.
    auto_reconnect: bool,
    /// Value `open()` restores after `close()` cleared the live flag.
    preferred_auto_reconnect: bool,
    /// Queue unsent frames instead of dropping them.
    keep_unsent_messages: bool,
    /// Unsent frames, oldest first.
    pending: VecDeque<String>,
    /// Reconnect timer.
    reconnect: ReconnectTimer,
}

impl LinkState {
    fn ready_state(&self) -> ReadyState {
        self.transport
            .as_ref()
            .map_or(ReadyState::Closed, |transport| transport.state())
    }
}

// ============================================================================
// Connection - Constructors
// ============================================================================

impl Connection {
    /// Starts building a connection to `address`.
    #[inline]
    #[must_use]
    pub fn builder(address: impl Into<String>) -> ConnectionBuilder {
        ConnectionBuilder::new(address)
    }

    /// Connects to `address` over WebSocket with default settings.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `address` is empty or not a `ws`/`wss` URL
    /// - [`Error::Connection`] if no tokio runtime is available
    pub fn connect(address: impl Into<String>) -> Result<Self> {
        ConnectionBuilder::new(address).build()
    }

    /// Creates a connection without connecting.
    pub(crate) fn from_parts(
        address: String,
        protocol: Option<String>,
        mode: Mode,
        auto_reconnect: bool,
        reconnect_interval: Duration,
        keep_unsent_messages: bool,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                address,
                protocol,
                mode,
                reconnect_interval,
                connector,
                listeners: Listeners::default(),
                state: Mutex::new(LinkState {
                    transport: None,
                    generation: 0,
                    auto_reconnect,
                    preferred_auto_reconnect: auto_reconnect,
                    keep_unsent_messages,
                    pending: VecDeque::new(),
                    reconnect: ReconnectTimer::default(),
                }),
            }),
        }
    }
}

// ============================================================================
// Connection - Accessors
// ============================================================================

impl Connection {
    /// Returns the endpoint address.
    #[inline]
    #[must_use]
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// Returns the sub-protocol, if any.
    #[inline]
    #[must_use]
    pub fn protocol(&self) -> Option<&str> {
        self.inner.protocol.as_deref()
    }

    /// Returns the dispatch mode.
    #[inline]
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.inner.mode
    }

    /// Returns the reconnect polling period.
    #[inline]
    #[must_use]
    pub fn reconnect_interval(&self) -> Duration {
        self.inner.reconnect_interval
    }

    /// Returns the live transport state, `Closed` before the first connect.
    #[must_use]
    pub fn state(&self) -> ReadyState {
        self.lock().ready_state()
    }

    /// Returns `true` if the transport is open.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == ReadyState::Open
    }

    /// Returns the live auto-reconnect flag.
    #[must_use]
    pub fn auto_reconnect(&self) -> bool {
        self.lock().auto_reconnect
    }

    /// Enables or disables auto-reconnect.
    ///
    /// Disabling cancels an armed reconnect timer.
    pub fn set_auto_reconnect(&self, enabled: bool) {
        let mut state = self.lock();
        state.auto_reconnect = enabled;
        state.preferred_auto_reconnect = enabled;
        if !enabled {
            state.reconnect.cancel();
        }
    }

    /// Returns whether unsent messages are queued.
    #[must_use]
    pub fn keep_unsent_messages(&self) -> bool {
        self.lock().keep_unsent_messages
    }

    /// Enables or disables queueing of unsent messages.
    ///
    /// Disabling discards anything already queued.
    pub fn set_keep_unsent_messages(&self, keep: bool) {
        let mut state = self.lock();
        state.keep_unsent_messages = keep;
        if !keep && !state.pending.is_empty() {
            debug!(
                address = %self.inner.address,
                discarded = state.pending.len(),
                "Discarding queued messages"
            );
            state.pending.clear();
        }
    }

    /// Returns the number of queued frames.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Returns `true` while the reconnect timer is armed.
    #[must_use]
    pub fn is_reconnect_armed(&self) -> bool {
        self.lock().reconnect.is_armed()
    }

    /// Returns `true` if both handles refer to the same connection.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

// ============================================================================
// Connection - Lifecycle
// ============================================================================

impl Connection {
    /// Opens (or reopens) the transport.
    ///
    /// Restores the auto-reconnect preference cleared by [`close`](Self::close).
    /// Does nothing if the transport is already open or connecting.
    ///
    /// # Errors
    ///
    /// Returns the connector's error if the attempt cannot be started.
    pub fn open(&self) -> Result<&Self> {
        {
            let mut state = self.lock();
            state.auto_reconnect = state.preferred_auto_reconnect;

            if matches!(
                state.ready_state(),
                ReadyState::Open | ReadyState::Connecting
            ) {
                trace!(address = %self.inner.address, "Already open");
                return Ok(self);
            }
        }

        self.connect_transport()?;
        Ok(self)
    }

    /// Closes the transport and keeps it closed.
    ///
    /// Disables auto-reconnect and cancels an armed reconnect timer. The
    /// `close` event fires once the transport reports it closed.
    pub fn close(&self) -> &Self {
        let mut state = self.lock();
        state.auto_reconnect = false;
        if state.reconnect.cancel() {
            debug!(address = %self.inner.address, "Reconnect timer cancelled");
        }

        if let Some(transport) = state.transport.as_ref() {
            transport.close();
        }

        debug!(address = %self.inner.address, "Close requested");
        self
    }

    /// Creates a fresh transport, replacing the current one.
    pub(crate) fn connect_transport(&self) -> Result<()> {
        let request = ConnectRequest {
            address: self.inner.address.clone(),
            protocol: self.inner.protocol.clone(),
        };

        // Held across connect so the new transport's callbacks cannot
        // observe the previous generation.
        let mut state = self.lock();
        let generation = state.generation + 1;
        let events = TransportEvents::new(self.sink(), generation);

        let transport = self.inner.connector.connect(&request, events)?;
        state.generation = generation;
        let previous = state.transport.replace(transport);
        drop(state);

        if let Some(previous) = previous {
            previous.close();
        }

        debug!(address = %self.inner.address, generation, "Transport connecting");
        Ok(())
    }

    fn sink(&self) -> Weak<dyn EventSink> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        weak
    }

    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.inner.state.lock()
    }

    /// Arms the reconnect timer if auto-reconnect is enabled.
    fn arm_reconnect(&self, generation: u64) {
        let mut state = self.lock();
        if !state.auto_reconnect || state.generation != generation {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let armed = state.reconnect.arm(self.inner.reconnect_interval, move || {
            let Some(inner) = weak.upgrade() else {
                return false;
            };
            Connection { inner }.reconnect_tick();
            true
        });

        if armed {
            info!(
                address = %self.inner.address,
                interval_ms = millis_saturating(self.inner.reconnect_interval),
                "Auto-reconnect armed"
            );
        }
    }

    /// One reconnect timer tick.
    fn reconnect_tick(&self) {
        if self.state() != ReadyState::Closed {
            return;
        }

        debug!(address = %self.inner.address, "Attempting reconnect");
        if let Err(e) = self.connect_transport() {
            debug!(address = %self.inner.address, error = %e, "Reconnect attempt failed");
        }
    }
}

// ============================================================================
// Connection - Send
// ============================================================================

impl Connection {
    /// Sends a message, framed according to the connection's [`Mode`].
    ///
    /// Strings are sent as plain text (`TextOnly`, `Hybrid`) or as a
    /// data-less event (`EventOnly`). Use [`Outgoing::event`] or
    /// [`send_event`](Self::send_event) for event frames.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if the message shape does not fit the mode
    /// - [`Error::ConnectionClosed`] if the transport dropped a frame
    pub fn send(&self, message: impl Into<Outgoing>) -> Result<()> {
        let frames = self.inner.mode.frames(message.into())?;

        let mut state = self.lock();
        for frame in frames {
            self.safe_send(&mut state, frame)?;
        }
        Ok(())
    }

    /// Sends a plain text message.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    #[inline]
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(Outgoing::Text(text.into()))
    }

    /// Sends `data` once per event name.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if `data` cannot be serialized
    /// - otherwise see [`send`](Self::send)
    pub fn send_event(&self, events: impl Into<EventNames>, data: impl Serialize) -> Result<()> {
        let data = serde_json::to_value(data)?;
        self.send(Outgoing::event(events, data))
    }

    /// Sends, queues, or drops one frame.
    fn safe_send(&self, state: &mut LinkState, frame: String) -> Result<()> {
        if state.ready_state() != ReadyState::Open {
            if state.keep_unsent_messages {
                state.pending.push_back(frame);
                trace!(address = %self.inner.address, queued = state.pending.len(), "Frame queued");
            } else {
                trace!(address = %self.inner.address, "Frame dropped, not open");
            }
            return Ok(());
        }

        // Older frames go first
        if !state.pending.is_empty() {
            self.flush_pending(state);
            if !state.pending.is_empty() {
                state.pending.push_back(frame);
                return Ok(());
            }
        }

        match state.transport.as_ref() {
            Some(transport) => transport.send(frame),
            None => Err(Error::ConnectionClosed),
        }
    }

    /// Drains queued frames in order while the transport stays open.
    fn flush_pending(&self, state: &mut LinkState) {
        let mut flushed = 0usize;

        while let Some(frame) = state.pending.pop_front() {
            let Some(transport) = state
                .transport
                .as_ref()
                .filter(|t| t.state() == ReadyState::Open)
            else {
                state.pending.push_front(frame);
                break;
            };

            if let Err(e) = transport.send(frame.clone()) {
                warn!(address = %self.inner.address, error = %e, "Flush interrupted");
                state.pending.push_front(frame);
                break;
            }
            flushed += 1;
        }

        if flushed > 0 {
            debug!(
                address = %self.inner.address,
                flushed,
                remaining = state.pending.len(),
                "Flushed queued frames"
            );
        }
    }
}

// ============================================================================
// Connection - Events
// ============================================================================

impl Connection {
    /// Subscribes `handler` to `event`.
    pub fn on<F>(&self, event: &str, handler: F) -> ListenerId
    where
        F: Fn(&Connection, &EventPayload) + Send + Sync + 'static,
    {
        self.inner.listeners.add(event, Arc::new(handler))
    }

    /// Subscribes an already shared handler to `event`.
    pub fn add_listener(&self, event: &str, handler: Handler) -> ListenerId {
        self.inner.listeners.add(event, handler)
    }

    /// Removes one subscription. Returns `true` if it existed.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.inner.listeners.remove(event, id)
    }

    /// Returns `true` if `event` has subscribers.
    #[must_use]
    pub fn has_listeners(&self, event: &str) -> bool {
        self.inner.listeners.has(event)
    }

    /// Removes every subscription.
    pub fn clear_listeners(&self) {
        self.inner.listeners.clear();
    }

    /// Invokes the handlers of `event` in subscription order.
    fn fire(&self, event: &str, payload: &EventPayload) {
        for handler in self.inner.listeners.snapshot(event) {
            handler(self, payload);
        }
    }

    /// Fires events for one inbound frame.
    fn dispatch(&self, frame: String) {
        match self.inner.mode.decode(frame) {
            Inbound::Text(text) => {
                self.fire(EVENT_MESSAGE, &EventPayload::Text(text));
            }
            Inbound::Envelope(envelope) => {
                self.fire(&envelope.event, &EventPayload::Data(envelope.data.clone()));
                self.fire(EVENT_MESSAGE, &EventPayload::Envelope(envelope));
            }
            Inbound::Fallback(text) => {
                // Legacy behaviour: unstructured text doubles as an event name
                self.fire(&text, &EventPayload::Text(text.clone()));
                self.fire(EVENT_MESSAGE, &EventPayload::Text(text));
            }
            Inbound::Invalid { frame, error } => {
                warn!(
                    address = %self.inner.address,
                    len = frame.len(),
                    "Undecodable frame in event-only mode"
                );
                self.fire(EVENT_ERROR, &EventPayload::Error(Arc::new(error)));
            }
        }
    }

    /// Returns `true` if `generation` belongs to the current transport.
    fn is_current(&self, generation: u64) -> bool {
        let current = self.lock().generation;
        if current != generation {
            trace!(
                address = %self.inner.address,
                generation,
                current,
                "Ignoring stale transport callback"
            );
        }
        current == generation
    }
}

// ============================================================================
// Transport Callbacks
// ============================================================================

impl EventSink for Inner {
    fn transport_opened(self: Arc<Self>, generation: u64) {
        let conn = Connection { inner: self };
        {
            let mut state = conn.lock();
            if state.generation != generation {
                return;
            }

            // Re-armed on the next unexpected close
            if state.reconnect.cancel() {
                debug!(address = %conn.inner.address, "Reconnected");
            }

            if state.keep_unsent_messages && !state.pending.is_empty() {
                conn.flush_pending(&mut state);
            }
        }

        info!(address = %conn.inner.address, "Connection open");
        conn.fire(EVENT_OPEN, &EventPayload::None);
    }

    fn transport_errored(self: Arc<Self>, generation: u64, error: Error) {
        let conn = Connection { inner: self };
        if !conn.is_current(generation) {
            return;
        }

        debug!(address = %conn.inner.address, error = %error, "Transport error");
        conn.fire(EVENT_ERROR, &EventPayload::Error(Arc::new(error)));
    }

    fn transport_closed(self: Arc<Self>, generation: u64) {
        let conn = Connection { inner: self };
        if !conn.is_current(generation) {
            return;
        }

        info!(address = %conn.inner.address, "Connection closed");
        conn.fire(EVENT_CLOSE, &EventPayload::None);
        conn.arm_reconnect(generation);
    }

    fn transport_received(self: Arc<Self>, generation: u64, frame: String) {
        let conn = Connection { inner: self };
        if !conn.is_current(generation) {
            return;
        }

        trace!(address = %conn.inner.address, len = frame.len(), "Frame received");
        conn.dispatch(frame);
    }
}

// ============================================================================
// Trait Implementations
// ============================================================================

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Connection")
            .field("address", &self.inner.address)
            .field("protocol", &self.inner.protocol)
            .field("mode", &self.inner.mode)
            .field("state", &state.ready_state())
            .field("auto_reconnect", &state.auto_reconnect)
            .field("pending", &state.pending.len())
            .field("listeners", &self.inner.listeners)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
