//! Loopback WebSocket echo peer.
//!
//! Echoes every text frame back to its sender. Useful as the far end of a
//! half-duplex exchange in demos and tests.
//!
//! # Example
//!
//! ```ignore
//! use std::net::{IpAddr, Ipv4Addr};
//! use websocket_halfduplex::transport::EchoServer;
//!
//! let server = EchoServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).await?;
//! let ws_url = server.ws_url();
//! server.spawn();
//!
//! // Connect a client to ws_url...
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::error::Result;

// ============================================================================
// EchoBehavior
// ============================================================================

/// How each accepted connection answers.
#[derive(Debug, Clone, Copy, Default)]
struct EchoBehavior {
    /// Delay before each echo.
    reply_delay: Duration,
    /// Swallow messages instead of echoing them.
    silent: bool,
}

// ============================================================================
// EchoServer
// ============================================================================

/// A bound echo server that has not started accepting yet.
pub struct EchoServer {
    /// TCP listener for incoming connections.
    listener: TcpListener,
    /// Actual bound address.
    local_addr: SocketAddr,
    behavior: EchoBehavior,
}

impl EchoServer {
    /// Binds to the specified address and port.
    ///
    /// Use port 0 to let the OS assign a random available port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if binding fails.
    pub async fn bind(ip: IpAddr, port: u16) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::new(ip, port)).await?;
        let local_addr = listener.local_addr()?;

        debug!(%local_addr, "Echo server bound");

        Ok(Self {
            listener,
            local_addr,
            behavior: EchoBehavior::default(),
        })
    }

    /// Delays every echo by `delay`.
    #[inline]
    #[must_use]
    pub fn with_reply_delay(mut self, delay: Duration) -> Self {
        self.behavior.reply_delay = delay;
        self
    }

    /// Never replies.
    #[inline]
    #[must_use]
    pub fn silent(mut self) -> Self {
        self.behavior.silent = true;
        self
    }

    /// Returns the port the server is bound to.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Returns the local socket address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the WebSocket URL for this server.
    ///
    /// Format: `ws://{ip}:{port}`
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    /// Starts accepting connections on a background task.
    ///
    /// Abort the returned handle to stop the server.
    pub fn spawn(self) -> JoinHandle<()> {
        info!(addr = %self.local_addr, "Echo server started");
        tokio::spawn(Self::accept_loop(self.listener, self.behavior))
    }

    async fn accept_loop(listener: TcpListener, behavior: EchoBehavior) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(%addr, "TCP connection accepted");
                    tokio::spawn(Self::serve(stream, addr, behavior));
                }
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    break;
                }
            }
        }
    }

    async fn serve(stream: TcpStream, addr: SocketAddr, behavior: EchoBehavior) {
        let ws_stream = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!(%addr, error = %e, "WebSocket upgrade failed");
                return;
            }
        };

        let (mut ws_write, mut ws_read) = ws_stream.split();

        while let Some(message) = ws_read.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    if behavior.silent {
                        continue;
                    }
                    if !behavior.reply_delay.is_zero() {
                        tokio::time::sleep(behavior.reply_delay).await;
                    }
                    if let Err(e) = ws_write.send(Message::Text(text)).await {
                        warn!(%addr, error = %e, "Echo failed");
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(%addr, error = %e, "Peer connection error");
                    break;
                }
            }
        }

        debug!(%addr, "Echo connection finished");
    }
}

// ============================================================================
// Tests
// ============================================================================
