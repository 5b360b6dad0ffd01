//! WebSocket transport layer.
//!
//! This module defines the seam between the synchronizer and the
//! connection it rides on, and supplies a tokio-tungstenite implementation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   Transport::transmit   ┌──────────────────┐
//! │  Synchronizer    │────────────────────────►│  Connection      │
//! │  (Endpoint)      │◄────────────────────────│  event loop      │◄──► peer
//! └──────────────────┘   Endpoint::on_message  └──────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | WebSocket client connection and event loop |
//! | `server` | Loopback echo peer |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::{Error, Result};

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket client connection and event loop.
pub mod connection;

/// Loopback WebSocket echo peer.
pub mod server;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, EventLoop};
pub use server::EchoServer;

// ============================================================================
// Transport
// ============================================================================

/// Outbound half of a connection.
///
/// Implementations must already be connected; framing is their concern.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transmits one text message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message could not be handed to the peer.
    async fn transmit(&self, text: String) -> Result<()>;

    /// Closes the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails.
    async fn close(&self) -> Result<()>;
}

// ============================================================================
// Endpoint
// ============================================================================

/// Inbound callbacks driven by a transport's delivery task.
///
/// Callbacks may run on any thread and must not block.
pub trait Endpoint: Send + Sync {
    /// Called once the connection is ready.
    fn on_open(&self);

    /// Called for every inbound text message.
    ///
    /// # Errors
    ///
    /// An error means the endpoint can no longer accept traffic; the
    /// transport reports it through [`Endpoint::on_error`] and closes.
    fn on_message(&self, text: String) -> Result<()>;

    /// Called once after the connection has closed.
    fn on_close(&self);

    /// Called when the connection or a callback fails.
    fn on_error(&self, error: &Error);
}
