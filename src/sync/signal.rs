//! One-shot signal carrying a single value.
//!
//! [`arm`] creates a linked [`Release`] / [`Wait`] pair. The release side
//! is consumed by [`Release::release`], so it fires at most once; the wait
//! side completes at most once. A new pair is armed for every exchange.
//!
//! # Example
//!
//! ```ignore
//! let (release, mut wait) = arm::<String>();
//!
//! tokio::spawn(async move {
//!     let _ = release.release("reply".to_string());
//! });
//!
//! let value = wait.wait_for(Duration::from_secs(1)).await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::timeout;

use crate::error::{Error, Result};

// ============================================================================
// Arm
// ============================================================================

/// Arms a fresh signal.
#[inline]
#[must_use]
pub fn arm<T>() -> (Release<T>, Wait<T>) {
    let (tx, rx) = oneshot::channel();
    (Release { tx }, Wait { rx })
}

// ============================================================================
// Release
// ============================================================================

/// Release side of an armed signal.
#[derive(Debug)]
pub struct Release<T> {
    tx: oneshot::Sender<T>,
}

impl<T> Release<T> {
    /// Releases the signal with `value`.
    ///
    /// Returns the value back if the wait side has been dropped.
    #[inline]
    pub fn release(self, value: T) -> std::result::Result<(), T> {
        self.tx.send(value)
    }

    /// Returns `true` if the wait side has been dropped.
    #[inline]
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

// ============================================================================
// Wait
// ============================================================================

/// Wait side of an armed signal.
#[derive(Debug)]
pub struct Wait<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Wait<T> {
    /// Waits for the release, bounded by `wait_timeout`.
    ///
    /// After a [`Error::Timeout`] the wait is still armed and may be
    /// awaited again. After any other outcome it is spent and must be
    /// dropped.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if nothing was released in time
    /// - [`Error::Interrupted`] if the release side was dropped
    pub async fn wait_for(&mut self, wait_timeout: Duration) -> Result<T> {
        match timeout(wait_timeout, &mut self.rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Error::Interrupted(e)),
            Err(_) => Err(Error::timeout(
                "timed out waiting to receive",
                wait_timeout.as_millis() as u64,
            )),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
