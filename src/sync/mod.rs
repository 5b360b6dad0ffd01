//! Half-duplex synchronization.
//!
//! Enforces strict send/receive alternation over a transport that can
//! send and receive independently.
//!
//! # Exchange Flow
//!
//! ```text
//! application task                    transport event loop
//! ────────────────                    ────────────────────
//! send(msg)
//!   phase → ExpectingReceive
//!   arm signal
//!   transmit ─────────────────────────►  peer
//! receive(timeout)                    on_message_arrived(reply)
//!   wait on signal  ◄──── release ────   validate phase
//!   phase → ExpectingSend
//!   return reply
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `phase` | Protocol phase and timeout policy |
//! | `signal` | One-shot release/wait pair |
//! | `synchronizer` | The state machine itself |

// ============================================================================
// Submodules
// ============================================================================

/// Protocol phase of a synchronizer.
pub mod phase;

/// One-shot signal carrying a single value.
pub mod signal;

/// Half-duplex synchronizer state machine.
pub mod synchronizer;

// ============================================================================
// Re-exports
// ============================================================================

pub use phase::{Phase, TimeoutPolicy};
pub use signal::{Release, Wait, arm};
pub use synchronizer::{DEFAULT_RECEIVE_TIMEOUT, Synchronizer};
