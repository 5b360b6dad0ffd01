//! Half-duplex WebSocket client.
//!
//! Ties a [`Synchronizer`](crate::sync::Synchronizer) to a live
//! [`Connection`](crate::transport::Connection).
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`HalfDuplexClient`] | Connected client: send, receive, exchange |
//! | [`HalfDuplexClientBuilder`] | Fluent configuration builder |
//! | [`ClientOptions`] | Timeouts and timeout policy |
//!
//! # Example
//!
//! ```no_run
//! use websocket_halfduplex::{HalfDuplexClient, Result};
//!
//! # async fn example() -> Result<()> {
//! let client = HalfDuplexClient::builder()
//!     .url("ws://127.0.0.1:9001")
//!     .connect()
//!     .await?;
//!
//! client.send("Hello, World!").await?;
//! let reply = client.receive().await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder for client configuration.
pub mod builder;

/// Connected client.
pub mod core;

/// Client timeouts and policies.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::HalfDuplexClientBuilder;
pub use self::core::HalfDuplexClient;
pub use options::{ClientOptions, DEFAULT_CONNECT_TIMEOUT};
