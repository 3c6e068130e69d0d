//! Connection configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use wsrelay::{ConnectionConfig, Mode};
//!
//! let config = ConnectionConfig::new()
//!     .with_mode(Mode::EventOnly)
//!     .with_reconnect_interval(Duration::from_secs(1))
//!     .with_keep_unsent_messages(true);
//! ```
//!
//! The config also loads from JSON:
//!
//! ```json
//! { "protocol": "chat", "mode": "event-only", "reconnectInterval": 1000 }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::Mode;

// ============================================================================
// Constants
// ============================================================================

/// Default polling period of the reconnect timer.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(5000);

// ============================================================================
// ConnectionConfig
// ============================================================================

/// Options fixed at connection construction.
///
/// `auto_reconnect` and `keep_unsent_messages` stay mutable afterwards
/// through the connection itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionConfig {
    /// Sub-protocol to negotiate.
    pub protocol: Option<String>,

    /// Send/receive dispatch strategy.
    #[serde(alias = "communicationType")]
    pub mode: Mode,

    /// Reconnect after an unexpected close.
    pub auto_reconnect: bool,

    /// Polling period of the reconnect timer.
    #[serde(
        rename = "reconnectInterval",
        alias = "autoReconnectInterval",
        with = "duration_ms"
    )]
    pub reconnect_interval: Duration,

    /// Defer connecting until `open()` is called.
    #[serde(alias = "lazyConnection")]
    pub lazy_open: bool,

    /// Queue sends made while not open and flush them on open.
    pub keep_unsent_messages: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ConnectionConfig {
    /// Creates a config with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            protocol: None,
            mode: Mode::Hybrid,
            auto_reconnect: true,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            lazy_open: false,
            keep_unsent_messages: false,
        }
    }

    /// Parses a config from JSON, filling missing fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the JSON is malformed or invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::config(format!("invalid connection config: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ConnectionConfig {
    /// Sets the sub-protocol.
    #[inline]
    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    /// Sets the dispatch mode.
    #[inline]
    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Enables or disables auto-reconnect.
    #[inline]
    #[must_use]
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Sets the reconnect polling period.
    #[inline]
    #[must_use]
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Defers connecting until `open()`.
    #[inline]
    #[must_use]
    pub fn with_lazy_open(mut self, lazy: bool) -> Self {
        self.lazy_open = lazy;
        self
    }

    /// Enables or disables queueing of unsent messages.
    #[inline]
    #[must_use]
    pub fn with_keep_unsent_messages(mut self, keep: bool) -> Self {
        self.keep_unsent_messages = keep;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ConnectionConfig {
    /// Checks the config for values no connection can run with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the reconnect interval is zero or the
    /// protocol is empty.
    pub fn validate(&self) -> Result<()> {
        if self.reconnect_interval.is_zero() {
            return Err(Error::config("reconnect interval must be positive"));
        }

        if self.protocol.as_deref().is_some_and(str::is_empty) {
            return Err(Error::config(
                "protocol must not be empty; leave it unset instead",
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Serde Helpers
// ============================================================================

/// Whole milliseconds of `duration`, saturating at `u64::MAX`.
pub(crate) fn millis_saturating(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(super::millis_saturating(*value))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.protocol, None);
        assert_eq!(config.mode, Mode::Hybrid);
        assert!(config.auto_reconnect);
        assert_eq!(config.reconnect_interval, Duration::from_millis(5000));
        assert!(!config.lazy_open);
        assert!(!config.keep_unsent_messages);
    }

    #[test]
    fn test_builder_chain() {
        let config = ConnectionConfig::new()
            .with_protocol("chat")
            .with_mode(Mode::TextOnly)
            .with_auto_reconnect(false)
            .with_reconnect_interval(Duration::from_millis(250))
            .with_lazy_open(true)
            .with_keep_unsent_messages(true);

        assert_eq!(config.protocol.as_deref(), Some("chat"));
        assert_eq!(config.mode, Mode::TextOnly);
        assert!(!config.auto_reconnect);
        assert_eq!(config.reconnect_interval, Duration::from_millis(250));
        assert!(config.lazy_open);
        assert!(config.keep_unsent_messages);
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            ConnectionConfig::from_json(r#"{"mode":"event-only","reconnectInterval":1000}"#)
                .expect("parse");
        assert_eq!(config.mode, Mode::EventOnly);
        assert_eq!(config.reconnect_interval, Duration::from_secs(1));
        assert!(config.auto_reconnect);
    }

    #[test]
    fn test_from_json_legacy_names() {
        let config = ConnectionConfig::from_json(
            r#"{"communicationType":"text","autoReconnectInterval":200,"lazyConnection":true}"#,
        )
        .expect("parse");
        assert_eq!(config.mode, Mode::TextOnly);
        assert_eq!(config.reconnect_interval, Duration::from_millis(200));
        assert!(config.lazy_open);
    }

    #[test]
    fn test_serialize_camel_case() {
        let json = serde_json::to_value(ConnectionConfig::new()).expect("encode");
        assert_eq!(json["reconnectInterval"], 5000);
        assert_eq!(json["keepUnsentMessages"], false);
        assert_eq!(json["mode"], "hybrid");
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let err = ConnectionConfig::new()
            .with_reconnect_interval(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(err.is_config_error());

        let err = ConnectionConfig::from_json(r#"{"reconnectInterval":0}"#).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_millis_saturate() {
        assert_eq!(millis_saturating(Duration::from_millis(1500)), 1500);
        assert_eq!(millis_saturating(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_validate_rejects_empty_protocol() {
        assert!(ConnectionConfig::new().with_protocol("").validate().is_err());
    }
}
