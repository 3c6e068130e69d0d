//! Transport handle contract.
//!
//! A transport is a raw, full-duplex, message-oriented connection: one
//! frame in, one frame out. Connections drive it through three pieces:
//!
//! - [`Connector`] creates a transport for an address
//! - [`TransportHandle`] sends frames, closes, and reports [`ReadyState`]
//! - [`TransportEvents`] is the callback slot set the transport reports into

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use crate::error::{Error, Result};

// ============================================================================
// ReadyState
// ============================================================================

/// Lifecycle state of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReadyState {
    /// The connection is not yet open.
    Connecting = 0,
    /// The connection is open and ready to communicate.
    Open = 1,
    /// The connection is in the process of closing.
    Closing = 2,
    /// The connection is closed or couldn't be opened.
    Closed = 3,
}

impl ReadyState {
    /// Returns the numeric state code.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts a numeric state code back into a state.
    #[inline]
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Connecting),
            1 => Some(Self::Open),
            2 => Some(Self::Closing),
            3 => Some(Self::Closed),
            _ => None,
        }
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// SharedReadyState
// ============================================================================

/// Ready state shared between a handle and its I/O side.
#[derive(Debug, Clone)]
pub struct SharedReadyState(Arc<AtomicU8>);

impl SharedReadyState {
    /// Creates a shared state starting at `state`.
    #[must_use]
    pub fn new(state: ReadyState) -> Self {
        Self(Arc::new(AtomicU8::new(state.as_u8())))
    }

    /// Returns the current state.
    #[must_use]
    pub fn get(&self) -> ReadyState {
        ReadyState::from_u8(self.0.load(Ordering::SeqCst)).unwrap_or(ReadyState::Closed)
    }

    /// Replaces the current state.
    pub fn set(&self, state: ReadyState) {
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Moves from `Connecting` to `Open`.
    ///
    /// Returns `false` if a close was requested first.
    pub fn try_open(&self) -> bool {
        self.0
            .compare_exchange(
                ReadyState::Connecting.as_u8(),
                ReadyState::Open.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Moves to `Closing` unless already closing or closed.
    ///
    /// Returns `true` if the state changed.
    pub fn begin_close(&self) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current < ReadyState::Closing.as_u8()).then_some(ReadyState::Closing.as_u8())
            })
            .is_ok()
    }
}

// ============================================================================
// ConnectRequest
// ============================================================================

/// What a connector needs to create a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Endpoint address, e.g. `ws://localhost:8888`.
    pub address: String,
    /// Optional sub-protocol to negotiate.
    pub protocol: Option<String>,
}

// ============================================================================
// TransportEvents
// ============================================================================

/// Receiver of transport callbacks, implemented by connections.
pub(crate) trait EventSink: Send + Sync {
    fn transport_opened(self: Arc<Self>, generation: u64);
    fn transport_errored(self: Arc<Self>, generation: u64, error: Error);
    fn transport_closed(self: Arc<Self>, generation: u64);
    fn transport_received(self: Arc<Self>, generation: u64, frame: String);
}

/// Callback slots a transport reports into.
///
/// Every transport created for a connection gets its own generation tag;
/// callbacks from a transport that has since been replaced are ignored.
/// Callbacks after the connection is dropped are no-ops.
#[derive(Clone)]
pub struct TransportEvents {
    sink: Weak<dyn EventSink>,
    generation: u64,
}

impl TransportEvents {
    pub(crate) fn new(sink: Weak<dyn EventSink>, generation: u64) -> Self {
        Self { sink, generation }
    }

    /// Reports that the transport is open.
    pub fn opened(&self) {
        if let Some(sink) = self.sink.upgrade() {
            sink.transport_opened(self.generation);
        }
    }

    /// Reports a transport failure. Does not imply the transport closed.
    pub fn errored(&self, error: Error) {
        if let Some(sink) = self.sink.upgrade() {
            sink.transport_errored(self.generation, error);
        }
    }

    /// Reports that the transport is closed.
    pub fn closed(&self) {
        if let Some(sink) = self.sink.upgrade() {
            sink.transport_closed(self.generation);
        }
    }

    /// Delivers one inbound frame.
    pub fn received(&self, frame: String) {
        if let Some(sink) = self.sink.upgrade() {
            sink.transport_received(self.generation, frame);
        }
    }

    /// Returns the generation tag of this callback set.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Debug for TransportEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportEvents")
            .field("generation", &self.generation)
            .field("attached", &(self.sink.strong_count() > 0))
            .finish()
    }
}

// ============================================================================
// Traits
// ============================================================================

/// A live transport.
pub trait TransportHandle: Send + Sync {
    /// Returns the current state.
    fn state(&self) -> ReadyState;

    /// Sends one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the transport can no longer carry frames.
    fn send(&self, frame: String) -> Result<()>;

    /// Requests shutdown. The closed callback fires once shutdown completes.
    fn close(&self);
}

/// Factory for transports.
///
/// Implementations must not invoke any [`TransportEvents`] callback before
/// `connect` returns; connection attempts complete asynchronously.
pub trait Connector: Send + Sync {
    /// Starts connecting to `request.address`.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt cannot even be started, e.g. an
    /// invalid address or no async runtime.
    fn connect(
        &self,
        request: &ConnectRequest,
        events: TransportEvents,
    ) -> Result<Box<dyn TransportHandle>>;
}

// ============================================================================
// Tests
// ============================================================================
