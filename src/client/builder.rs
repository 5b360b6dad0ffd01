//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and connecting a
//! [`HalfDuplexClient`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use websocket_halfduplex::HalfDuplexClient;
//!
//! # async fn example() -> websocket_halfduplex::Result<()> {
//! let client = HalfDuplexClient::builder()
//!     .url("ws://127.0.0.1:9001")
//!     .receive_timeout(Duration::from_secs(5))
//!     .connect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::sync::TimeoutPolicy;

use super::core::HalfDuplexClient;
use super::options::ClientOptions;

// ============================================================================
// HalfDuplexClientBuilder
// ============================================================================

/// Builder for configuring a [`HalfDuplexClient`].
///
/// Use [`HalfDuplexClient::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct HalfDuplexClientBuilder {
    /// Server URL, unparsed.
    url: Option<String>,
    /// Timeouts and policy.
    options: ClientOptions,
}

// ============================================================================
// HalfDuplexClientBuilder Implementation
// ============================================================================

impl HalfDuplexClientBuilder {
    /// Creates a new builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server URL (`ws://` or `wss://`).
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Replaces all options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_connect_timeout(timeout);
        self
    }

    /// Sets the default receive timeout.
    #[inline]
    #[must_use]
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_receive_timeout(timeout);
        self
    }

    /// Sets the timeout policy.
    #[inline]
    #[must_use]
    pub fn timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.options = self.options.with_timeout_policy(policy);
        self
    }

    /// Validates the configuration and connects.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL is missing, has the wrong scheme, or a timeout is zero
    /// - [`Error::Url`] if the URL does not parse
    /// - [`Error::Connection`] / [`Error::ConnectionTimeout`] if connecting fails
    pub async fn connect(self) -> Result<HalfDuplexClient> {
        let url = self.validate_url()?;
        self.options.validate()?;

        HalfDuplexClient::open(url, self.options).await
    }
}

// ============================================================================
// Validation
// ============================================================================

impl HalfDuplexClientBuilder {
    /// Parses the URL and checks its scheme.
    fn validate_url(&self) -> Result<Url> {
        let raw = self.url.as_deref().ok_or_else(|| {
            Error::config(
                "Server URL is required. Use .url() to set it.\n\
                 Example: HalfDuplexClient::builder().url(\"ws://127.0.0.1:9001\")",
            )
        })?;

        let url = Url::parse(raw)?;

        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(Error::config(format!(
                "Unsupported URL scheme '{other}', expected ws or wss"
            ))),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
