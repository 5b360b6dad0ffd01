//! Connected half-duplex client.
//!
//! A [`HalfDuplexClient`] owns one WebSocket connection and the
//! synchronizer that enforces ping-pong usage of it.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::error::Result;
use crate::sync::{Phase, Synchronizer};
use crate::transport::{Connection, Endpoint};

use super::builder::HalfDuplexClientBuilder;
use super::options::ClientOptions;

// ============================================================================
// HalfDuplexClient
// ============================================================================

/// A WebSocket connection used strictly as send-then-receive.
///
/// Dropping the client shuts the connection down.
pub struct HalfDuplexClient {
    synchronizer: Arc<Synchronizer<Connection>>,
    url: Url,
    options: ClientOptions,
}

// ============================================================================
// HalfDuplexClient - Constructors
// ============================================================================

impl HalfDuplexClient {
    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> HalfDuplexClientBuilder {
        HalfDuplexClientBuilder::new()
    }

    /// Connects to `url` with default options.
    ///
    /// # Errors
    ///
    /// See [`HalfDuplexClientBuilder::connect`].
    pub async fn connect(url: &str) -> Result<Self> {
        Self::builder().url(url).connect().await
    }

    /// Connects and wires the synchronizer to the connection's event loop.
    pub(crate) async fn open(url: Url, options: ClientOptions) -> Result<Self> {
        let (connection, event_loop) = Connection::connect(&url, options.connect_timeout).await?;

        let synchronizer = Arc::new(Synchronizer::with_timeout_policy(
            connection,
            options.timeout_policy,
        ));

        let endpoint: Weak<dyn Endpoint> = Arc::downgrade(&synchronizer) as Weak<dyn Endpoint>;
        let _event_loop = event_loop.spawn(endpoint);

        Ok(Self {
            synchronizer,
            url,
            options,
        })
    }
}

// ============================================================================
// HalfDuplexClient - Exchange
// ============================================================================

impl HalfDuplexClient {
    /// Sends one message.
    ///
    /// # Errors
    ///
    /// See [`Synchronizer::send`].
    pub async fn send(&self, message: impl Into<String>) -> Result<()> {
        self.synchronizer.send(message).await
    }

    /// Waits for the reply using the configured receive timeout.
    ///
    /// # Errors
    ///
    /// See [`Synchronizer::receive`].
    pub async fn receive(&self) -> Result<String> {
        self.synchronizer.receive(self.options.receive_timeout).await
    }

    /// Waits for the reply with an explicit timeout.
    ///
    /// # Errors
    ///
    /// See [`Synchronizer::receive`].
    pub async fn receive_timeout(&self, timeout: Duration) -> Result<String> {
        self.synchronizer.receive(timeout).await
    }

    /// Sends `message` and waits for its reply.
    ///
    /// # Errors
    ///
    /// Any error from [`send`](Self::send) or [`receive`](Self::receive).
    pub async fn exchange(&self, message: impl Into<String>) -> Result<String> {
        self.send(message).await?;
        self.receive().await
    }
}

// ============================================================================
// HalfDuplexClient - Accessors
// ============================================================================

impl HalfDuplexClient {
    /// Returns the current protocol phase.
    #[inline]
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.synchronizer.phase()
    }

    /// Returns the server URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the client options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Returns the underlying synchronizer.
    #[inline]
    #[must_use]
    pub fn synchronizer(&self) -> &Arc<Synchronizer<Connection>> {
        &self.synchronizer
    }

    /// Returns `true` once the connection has terminated.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.synchronizer.transport().is_closed()
    }

    /// Closes the connection and waits for the close handshake.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WebSocket`](crate::Error::WebSocket) if the handshake fails.
    pub async fn close(&self) -> Result<()> {
        debug!(url = %self.url, "Closing client");
        self.synchronizer.close().await
    }
}

// ============================================================================
// Trait Implementations
// ============================================================================

impl fmt::Debug for HalfDuplexClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HalfDuplexClient")
            .field("url", &self.url.as_str())
            .field("phase", &self.phase())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Drop for HalfDuplexClient {
    fn drop(&mut self) {
        self.synchronizer.transport().shutdown();
    }
}
