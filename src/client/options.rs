//! Client timeouts and policies.
//!
//! Options can be built in code or loaded from JSON, where durations are
//! given in milliseconds:
//!
//! ```json
//! {
//!   "connectTimeoutMs": 30000,
//!   "receiveTimeoutMs": 60000,
//!   "timeoutPolicy": "keep_expecting_receive"
//! }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use websocket_halfduplex::ClientOptions;
//!
//! let options = ClientOptions::new()
//!     .with_receive_timeout(Duration::from_secs(5))
//!     .with_reset_on_timeout();
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sync::{DEFAULT_RECEIVE_TIMEOUT, TimeoutPolicy};

// ============================================================================
// Constants
// ============================================================================

/// Default bound on the connect handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ClientOptions
// ============================================================================

/// Client configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientOptions {
    /// Bound on TCP connect plus WebSocket upgrade.
    #[serde(rename = "connectTimeoutMs", with = "millis")]
    pub connect_timeout: Duration,

    /// Bound used by [`HalfDuplexClient::receive`](super::HalfDuplexClient::receive).
    #[serde(rename = "receiveTimeoutMs", with = "millis")]
    pub receive_timeout: Duration,

    /// Phase handling after a receive times out.
    pub timeout_policy: TimeoutPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ClientOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            timeout_policy: TimeoutPolicy::KeepExpectingReceive,
        }
    }

    /// Parses options from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the JSON is malformed
    /// - [`Error::Config`] if a timeout is zero
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Serializes options to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ClientOptions {
    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the default receive timeout.
    #[inline]
    #[must_use]
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Sets the timeout policy.
    #[inline]
    #[must_use]
    pub fn with_timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout_policy = policy;
        self
    }

    /// Returns to expecting a send after a receive times out.
    #[inline]
    #[must_use]
    pub fn with_reset_on_timeout(self) -> Self {
        self.with_timeout_policy(TimeoutPolicy::ResetToSend)
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientOptions {
    /// Checks that both timeouts are non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(Error::config("connect timeout must be greater than zero"));
        }
        if self.receive_timeout.is_zero() {
            return Err(Error::config("receive timeout must be greater than zero"));
        }
        Ok(())
    }
}

// ============================================================================
// Millisecond Durations
// ============================================================================

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ============================================================================
// Tests
// ============================================================================
