//! Transport layer.
//!
//! A transport is the raw, message-oriented socket underneath a
//! [`Connection`](crate::Connection). The connection owns exactly one
//! transport at a time and replaces it on every (re)connect.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  connect()   ┌──────────────┐
//! │   Connection     │─────────────►│  Connector   │
//! │                  │              └──────┬───────┘
//! │  TransportHandle │◄────────────────────┘
//! │  send / close    │
//! │                  │◄──── TransportEvents ────┐
//! └──────────────────┘  opened / errored /      │
//!                       closed / received   I/O side
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `handle` | Transport traits, ready state and callback slots |
//! | `memory` | In-process transport for tests |
//! | `websocket` | `tokio-tungstenite` client transport |

// ============================================================================
// Submodules
// ============================================================================

/// Transport traits and callback slots.
pub mod handle;

/// In-process transport for tests.
pub mod memory;

/// WebSocket client transport.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use handle::{
    ConnectRequest, Connector, ReadyState, SharedReadyState, TransportEvents, TransportHandle,
};
pub use memory::{MemoryConnector, MemorySession};
pub use websocket::{WsConnector, WsHandle};
