//! Error types for the half-duplex synchronizer.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use websocket_halfduplex::{HalfDuplexClient, Result};
//!
//! async fn example(client: &HalfDuplexClient) -> Result<String> {
//!     client.send("ping").await?;
//!     client.receive().await
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::Url`], [`Error::Json`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Exchange | [`Error::ProtocolViolation`], [`Error::Transport`], [`Error::Timeout`], [`Error::Interrupted`] |
//! | Fatal | [`Error::Faulted`] |
//! | External | [`Error::Io`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    ///
    /// Returned when WebSocket connection cannot be established.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection timeout while connecting to the peer.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// WebSocket connection closed.
    ///
    /// Returned when the connection task is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Exchange Errors
    // ========================================================================
    /// Send or receive called out of turn.
    ///
    /// Indicates a usage bug in the application driving the synchronizer.
    #[error("Protocol violation: {message}")]
    ProtocolViolation {
        /// Description of the violation.
        message: String,
    },

    /// The transport failed to transmit a message.
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the transmission failure.
        message: String,
    },

    /// No reply arrived within the bound.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The wait for a reply was aborted because its release side went away.
    #[error("Interrupted while waiting: {0}")]
    Interrupted(#[from] RecvError),

    // ========================================================================
    // Fatal Errors
    // ========================================================================
    /// The synchronizer received an unsolicited message and is poisoned.
    ///
    /// Every later operation fails with this error.
    #[error("Synchronizer faulted: {reason}")]
    Faulted {
        /// What caused the fault.
        reason: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a protocol violation error.
    #[inline]
    pub fn protocol_violation(message: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            message: message.into(),
        }
    }

    /// Protocol violation for a `send` issued while a receive is pending.
    #[inline]
    pub fn unexpected_send() -> Self {
        Self::protocol_violation("a receive was expected, not a send")
    }

    /// Protocol violation for a `receive` issued before a `send`.
    #[inline]
    pub fn unexpected_receive() -> Self {
        Self::protocol_violation("a send was expected, not a receive")
    }

    /// Creates a transport error.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a faulted error.
    #[inline]
    pub fn faulted(reason: impl Into<String>) -> Self {
        Self::Faulted {
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::Timeout { .. }
        )
    }

    /// Returns `true` if this is a protocol violation.
    #[inline]
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::ProtocolViolation { .. })
    }

    /// Returns `true` if the synchronizer is poisoned.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Faulted { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::Transport { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::Timeout { .. } | Self::Transport { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
