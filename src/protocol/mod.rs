//! Application-level message protocol.
//!
//! This module defines how application messages map to transport frames.
//!
//! # Protocol Overview
//!
//! | Frame | Format | Example |
//! |-------|--------|---------|
//! | Plain text | the raw string | `hello world` |
//! | Event | JSON envelope | `{"event":"init","data":{"my":"data"}}` |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `envelope` | The `{event, data}` wire format |
//! | `message` | Modes, outgoing messages and inbound classification |

// ============================================================================
// Submodules
// ============================================================================

/// Event envelope wire format.
pub mod envelope;

/// Communication modes and message shapes.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use envelope::Envelope;
pub use message::{EventNames, Inbound, Mode, Outgoing};
