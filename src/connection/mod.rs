//! Event-driven client connections.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Connection`] | Lifecycle, reconnect, safe-send and dispatch |
//! | [`ConnectionBuilder`] | Fluent configuration builder |
//! | [`ConnectionConfig`] | Construction options |
//! | [`EventPayload`] | Data delivered to event handlers |
//!
//! # Events
//!
//! | Event | Payload | Fired when |
//! |-------|---------|------------|
//! | `open` | [`EventPayload::None`] | the transport opened |
//! | `close` | [`EventPayload::None`] | the transport closed |
//! | `error` | [`EventPayload::Error`] | transport failure or undecodable event frame |
//! | `message` | [`EventPayload::Text`] / [`EventPayload::Envelope`] | every inbound frame |
//! | `<name>` | [`EventPayload::Data`] / [`EventPayload::Text`] | an envelope (or, in hybrid mode, raw text) named it |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder for connections.
pub mod builder;

/// Connection construction options.
pub mod config;

/// Connection lifecycle and protocol.
pub mod core;

/// Per-connection event subscriptions.
pub mod listeners;

/// Reconnect timer.
mod reconnect;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ConnectionBuilder;
pub use config::{ConnectionConfig, DEFAULT_RECONNECT_INTERVAL};
pub use core::Connection;
pub use listeners::{
    EVENT_CLOSE, EVENT_ERROR, EVENT_MESSAGE, EVENT_OPEN, EventPayload, Handler, ListenerId,
};
