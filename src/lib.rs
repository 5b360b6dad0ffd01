//! Half-duplex request/response over a full-duplex WebSocket.
//!
//! This library turns a WebSocket connection, which can send and receive
//! independently at any time, into a strict ping-pong channel: send one
//! message, then wait for exactly one reply.
//!
//! # Architecture
//!
//! - **Synchronizer**: a two-phase state machine (expecting send / expecting
//!   receive) guarded by a mutex, with a fresh one-shot signal per exchange
//! - **Transport**: the connection seam; a tokio-tungstenite implementation
//!   delivers inbound text frames to the synchronizer from its own task
//! - **Client**: connects, wires the two together, and applies timeouts
//!
//! An inbound message that nobody asked for poisons the synchronizer: it
//! enters a permanent faulted state instead of silently dropping traffic.
//!
//! # Quick Start
//!
//! ```no_run
//! use websocket_halfduplex::{HalfDuplexClient, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = HalfDuplexClient::connect("ws://127.0.0.1:9001").await?;
//!
//!     client.send("Hello, World!").await?;
//!     let reply = client.receive().await?;
//!     println!("{reply}");
//!
//!     client.close().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Connected client, builder and options |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`sync`] | Synchronizer state machine and one-shot signal |
//! | [`transport`] | Transport traits, WebSocket connection, echo peer |

// ============================================================================
// Modules
// ============================================================================

/// Connected half-duplex client.
///
/// Use [`HalfDuplexClient::builder()`] to configure and connect.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Half-duplex synchronization.
///
/// The state machine and its one-shot signal, independent of any socket.
pub mod sync;

/// WebSocket transport layer.
///
/// The [`Transport`] / [`Endpoint`] seam and its tokio-tungstenite implementation.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{ClientOptions, HalfDuplexClient, HalfDuplexClientBuilder};

// Error types
pub use error::{Error, Result};

// Synchronization types
pub use sync::{Phase, Synchronizer, TimeoutPolicy};

// Transport types
pub use transport::{Connection, EchoServer, Endpoint, Transport};
