//! Builder pattern for connection configuration.
//!
//! Provides a fluent API for configuring and creating [`Connection`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use wsrelay::{Connection, Mode};
//!
//! # async fn example() -> wsrelay::Result<()> {
//! let conn = Connection::builder("ws://localhost:8888")
//!     .mode(Mode::EventOnly)
//!     .reconnect_interval(Duration::from_secs(1))
//!     .keep_unsent_messages(true)
//!     .on("open", |conn, _| {
//!         let _ = conn.send_event("init", "This is a simple text");
//!     })
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::Mode;
use crate::transport::{Connector, WsConnector};

use super::config::ConnectionConfig;
use super::core::Connection;
use super::listeners::{EventPayload, Handler};

// ============================================================================
// ConnectionBuilder
// ============================================================================

/// Builder for configuring a [`Connection`].
///
/// Use [`Connection::builder()`] to create a new builder. Listeners added
/// here are in place before the first connect attempt, so no `open` is
/// missed.
#[must_use]
pub struct ConnectionBuilder {
    /// Endpoint address.
    address: String,
    /// Connection options.
    config: ConnectionConfig,
    /// Transport factory, WebSocket by default.
    connector: Option<Arc<dyn Connector>>,
    /// Listeners installed before connecting.
    listeners: Vec<(String, Handler)>,
}

// ============================================================================
// ConnectionBuilder Implementation
// ============================================================================

impl ConnectionBuilder {
    /// Creates a builder for `address` with default configuration.
    #[inline]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            config: ConnectionConfig::default(),
            connector: None,
            listeners: Vec::new(),
        }
    }

    /// Replaces the whole configuration.
    #[inline]
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the sub-protocol to negotiate.
    #[inline]
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.config.protocol = Some(protocol.into());
        self
    }

    /// Sets the dispatch mode.
    #[inline]
    pub fn mode(mut self, mode: Mode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Enables or disables auto-reconnect.
    #[inline]
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.config.auto_reconnect = enabled;
        self
    }

    /// Sets the reconnect polling period.
    #[inline]
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.config.reconnect_interval = interval;
        self
    }

    /// Defers connecting until [`Connection::open`].
    #[inline]
    pub fn lazy_open(mut self, lazy: bool) -> Self {
        self.config.lazy_open = lazy;
        self
    }

    /// Queues sends made while not open.
    #[inline]
    pub fn keep_unsent_messages(mut self, keep: bool) -> Self {
        self.config.keep_unsent_messages = keep;
        self
    }

    /// Uses a custom transport factory.
    #[inline]
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector) as Arc<dyn Connector>);
        self
    }

    /// Uses a shared transport factory.
    #[inline]
    pub fn shared_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Subscribes `handler` to `event` before connecting.
    pub fn on<F>(mut self, event: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Connection, &EventPayload) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        self.listeners.push((event.into(), handler));
        self
    }

    /// Builds the connection and, unless lazy, starts connecting.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the address is empty or the config is invalid
    /// - the connector's error if the first attempt cannot be started
    pub fn build(self) -> Result<Connection> {
        self.validate()?;

        let Self {
            address,
            config,
            connector,
            listeners,
        } = self;

        let connector =
            connector.unwrap_or_else(|| Arc::new(WsConnector::new()) as Arc<dyn Connector>);
        let connection = Connection::from_parts(
            address,
            config.protocol,
            config.mode,
            config.auto_reconnect,
            config.reconnect_interval,
            config.keep_unsent_messages,
            connector,
        );

        for (event, handler) in listeners {
            connection.add_listener(&event, handler);
        }

        debug!(
            address = connection.address(),
            mode = ?connection.mode(),
            lazy = config.lazy_open,
            "Connection created"
        );

        if !config.lazy_open {
            connection.connect_transport()?;
        }

        Ok(connection)
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ConnectionBuilder {
    fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(Error::config(
                "connection address is required.\n\
                 Example: Connection::builder(\"ws://localhost:8888\")",
            ));
        }

        self.config.validate()
    }
}

// ============================================================================
// Trait Implementations
// ============================================================================

impl fmt::Debug for ConnectionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionBuilder")
            .field("address", &self.address)
            .field("config", &self.config)
            .field("custom_connector", &self.connector.is_some())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
