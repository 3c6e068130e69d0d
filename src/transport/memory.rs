//! In-process transport for tests.
//!
//! [`MemoryConnector`] hands out transports whose far side is driven by
//! the test through [`MemorySession`]: open it, close it, fail it, push
//! frames into it, and inspect what the connection sent.
//!
//! # Example
//!
//! ```ignore
//! let connector = MemoryConnector::new();
//! let conn = Connection::builder("mem://a").connector(connector.clone()).build()?;
//!
//! let session = connector.latest().expect("connect attempted");
//! session.open();
//! conn.send("hello")?;
//! assert_eq!(session.sent(), vec!["hello"]);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::{Error, Result};

use super::handle::{
    ConnectRequest, Connector, ReadyState, SharedReadyState, TransportEvents, TransportHandle,
};

// ============================================================================
// MemoryConnector
// ============================================================================

/// Connector creating in-process transports.
///
/// Clones share the same attempt log.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    shared: Arc<ConnectorShared>,
}

#[derive(Debug, Default)]
struct ConnectorShared {
    /// Every connect attempt, in order.
    sessions: Mutex<Vec<MemorySession>>,
    /// Whether new attempts are rejected outright.
    refusing: AtomicBool,
}

impl MemoryConnector {
    /// Creates a connector that accepts every attempt.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent connect attempts fail (`true`) or succeed (`false`).
    pub fn set_refusing(&self, refusing: bool) {
        self.shared.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Returns the number of connect attempts made, refused ones included.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.shared.sessions.lock().len()
    }

    /// Returns the session of the `index`-th attempt.
    #[must_use]
    pub fn session(&self, index: usize) -> Option<MemorySession> {
        self.shared.sessions.lock().get(index).cloned()
    }

    /// Returns the session of the most recent attempt.
    #[must_use]
    pub fn latest(&self) -> Option<MemorySession> {
        self.shared.sessions.lock().last().cloned()
    }
}

impl Connector for MemoryConnector {
    fn connect(
        &self,
        request: &ConnectRequest,
        events: TransportEvents,
    ) -> Result<Box<dyn TransportHandle>> {
        let refused = self.shared.refusing.load(Ordering::SeqCst);
        let session = MemorySession {
            request: request.clone(),
            state: SharedReadyState::new(if refused {
                ReadyState::Closed
            } else {
                ReadyState::Connecting
            }),
            sent: Arc::new(Mutex::new(Vec::new())),
            close_requested: Arc::new(AtomicBool::new(false)),
            send_failing: Arc::new(AtomicBool::new(false)),
            sends_before_close: Arc::new(Mutex::new(None)),
            events,
        };
        self.shared.sessions.lock().push(session.clone());

        if refused {
            return Err(Error::connection(format!(
                "connection to {} refused",
                request.address
            )));
        }

        Ok(Box::new(MemoryHandle { session }))
    }
}

// ============================================================================
// MemorySession
// ============================================================================

/// Far side of one in-process transport.
#[derive(Debug, Clone)]
pub struct MemorySession {
    request: ConnectRequest,
    state: SharedReadyState,
    sent: Arc<Mutex<Vec<String>>>,
    close_requested: Arc<AtomicBool>,
    send_failing: Arc<AtomicBool>,
    sends_before_close: Arc<Mutex<Option<usize>>>,
    events: TransportEvents,
}

impl MemorySession {
    /// Returns the request this session was created for.
    #[must_use]
    pub fn request(&self) -> &ConnectRequest {
        &self.request
    }

    /// Returns the transport state.
    #[must_use]
    pub fn state(&self) -> ReadyState {
        self.state.get()
    }

    /// Returns every frame the connection sent, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Drains and returns the frames sent so far.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Returns `true` if the connection asked this transport to close.
    #[must_use]
    pub fn close_requested(&self) -> bool {
        self.close_requested.load(Ordering::SeqCst)
    }

    /// Makes every send fail while the transport stays open.
    pub fn set_send_failing(&self, failing: bool) {
        self.send_failing.store(failing, Ordering::SeqCst);
    }

    /// Starts closing (without firing closed) once `count` more frames
    /// have been accepted.
    pub fn close_after_sends(&self, count: usize) {
        *self.sends_before_close.lock() = Some(count);
    }

    /// Completes the handshake.
    pub fn open(&self) {
        self.state.set(ReadyState::Open);
        self.events.opened();
    }

    /// Closes the transport and fires the closed callback.
    ///
    /// Completes a requested shutdown or simulates a remote close.
    pub fn close(&self) {
        self.state.set(ReadyState::Closed);
        self.events.closed();
    }

    /// Reports an error, then closes.
    pub fn fail(&self, message: &str) {
        self.events.errored(Error::connection(message));
        self.close();
    }

    /// Reports an error without closing.
    pub fn error(&self, message: &str) {
        self.events.errored(Error::connection(message));
    }

    /// Delivers an inbound frame.
    pub fn deliver(&self, frame: impl Into<String>) {
        self.events.received(frame.into());
    }
}

// ============================================================================
// MemoryHandle
// ============================================================================

struct MemoryHandle {
    session: MemorySession,
}

impl TransportHandle for MemoryHandle {
    fn state(&self) -> ReadyState {
        self.session.state.get()
    }

    fn send(&self, frame: String) -> Result<()> {
        if self.session.state.get() != ReadyState::Open {
            return Err(Error::ConnectionClosed);
        }
        if self.session.send_failing.load(Ordering::SeqCst) {
            return Err(Error::connection("send failed"));
        }
        self.session.sent.lock().push(frame);

        let mut budget = self.session.sends_before_close.lock();
        if let Some(remaining) = budget.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                *budget = None;
                self.session.state.begin_close();
            }
        }
        Ok(())
    }

    fn close(&self) {
        self.session.close_requested.store(true, Ordering::SeqCst);
        self.session.state.begin_close();
    }
}

// ============================================================================
// Tests
// ============================================================================
