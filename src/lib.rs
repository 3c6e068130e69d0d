//! wsrelay - Event-driven WebSocket client connections.
//!
//! This library wraps a raw, message-oriented socket in a [`Connection`]
//! that adds automatic reconnection, queueing of unsent messages, and a
//! small `{event, data}` JSON protocol, plus a [`Registry`] for fanning
//! listeners and messages out over many connections.
//!
//! # Architecture
//!
//! - **Connection**: lifecycle, reconnect timer, safe-send and dispatch
//! - **Transport**: the socket underneath, created through a [`Connector`]
//! - **Registry**: connections keyed by address, broadcast and multicast
//!
//! Key design principles:
//!
//! - Every connection owns exactly one transport at a time
//! - Handlers run without any lock held, so they may send or close
//! - Reconnect failures are silent and retried at a fixed interval
//!
//! # Quick Start
//!
//! ```no_run
//! use wsrelay::{Connection, Mode, Registry, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let conn = Connection::builder("ws://localhost:8888")
//!         .mode(Mode::EventOnly)
//!         .keep_unsent_messages(true)
//!         .on("stop", |_, payload| println!("stop: {:?}", payload.as_data()))
//!         .build()?;
//!
//!     // Queued until the socket opens
//!     conn.send_event("init", serde_json::json!({ "my": "data" }))?;
//!
//!     Registry::global().register(&conn);
//!     Registry::global().broadcast("hello", None);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`connection`] | [`Connection`], builder, config and event payloads |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`protocol`] | Modes and the `{event, data}` envelope |
//! | [`registry`] | Address-keyed connection registry |
//! | [`transport`] | Transport traits, WebSocket and in-memory transports |

// ============================================================================
// Modules
// ============================================================================

/// Event-driven client connections.
///
/// Use [`Connection::builder()`] to create a configured connection.
pub mod connection;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Message protocol: modes and the event envelope.
pub mod protocol;

/// Address-keyed connection registry.
pub mod registry;

/// Transport layer.
///
/// Connections talk to sockets only through the traits defined here.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Connection types
pub use connection::{
    Connection, ConnectionBuilder, ConnectionConfig, DEFAULT_RECONNECT_INTERVAL, EVENT_CLOSE,
    EVENT_ERROR, EVENT_MESSAGE, EVENT_OPEN, EventPayload, Handler, ListenerId,
};

// Error types
pub use error::{Error, Result};

// Protocol types
pub use protocol::{Envelope, EventNames, Mode, Outgoing};

// Registry
pub use registry::Registry;

// Transport types
pub use transport::{
    ConnectRequest, Connector, MemoryConnector, MemorySession, ReadyState, TransportEvents,
    TransportHandle, WsConnector,
};
