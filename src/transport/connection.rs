//! WebSocket client connection and event loop.
//!
//! [`Connection`] is the cloneable command handle the synchronizer writes
//! through. [`EventLoop`] owns the socket; once spawned it forwards inbound
//! text frames to an [`Endpoint`] and serves outbound commands.
//!
//! # Event Loop
//!
//! The spawned tokio task handles:
//!
//! - Incoming text frames, delivered to [`Endpoint::on_message`]
//! - Outgoing transmit and close commands from [`Connection`]
//! - Lifecycle callbacks: open, close, error
//!
//! A callback error or socket error is reported through
//! [`Endpoint::on_error`], after which the connection is closed.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace};
use url::Url;

use crate::error::{Error, Result};

use super::{Endpoint, Transport};

// ============================================================================
// Types
// ============================================================================

/// Stream type produced by [`Connection::connect`].
pub type ClientStream = MaybeTlsStream<TcpStream>;

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Transmit a text frame and report the outcome.
    Transmit {
        text: String,
        ack_tx: oneshot::Sender<Result<()>>,
    },
    /// Run the close handshake and report the outcome.
    Close { ack_tx: oneshot::Sender<Result<()>> },
    /// Close without waiting for the outcome.
    Shutdown,
}

// ============================================================================
// Connection
// ============================================================================

/// Command handle to a WebSocket connection.
///
/// Cheap to clone; all clones drive the same event loop.
#[derive(Clone)]
pub struct Connection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
}

impl Connection {
    /// Connects to a WebSocket server.
    ///
    /// The returned [`EventLoop`] must be spawned before traffic flows.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the handshake exceeds `connect_timeout`
    /// - [`Error::Connection`] if the TCP connect or upgrade fails
    pub async fn connect(
        url: &Url,
        connect_timeout: Duration,
    ) -> Result<(Self, EventLoop<ClientStream>)> {
        debug!(%url, "Connecting");

        let (ws_stream, response) = timeout(connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| Error::connection_timeout(connect_timeout.as_millis() as u64))?
            .map_err(|e| Error::connection(format!("WebSocket handshake failed: {e}")))?;

        info!(%url, status = %response.status(), "WebSocket connection established");

        Ok(Self::new(ws_stream))
    }

    /// Wraps an already-upgraded WebSocket stream.
    pub fn new<S>(ws_stream: WebSocketStream<S>) -> (Self, EventLoop<S>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let connection = Self { command_tx };
        let event_loop = EventLoop {
            ws_stream,
            command_rx,
        };

        (connection, event_loop)
    }

    /// Returns `true` once the event loop has terminated.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    /// Asks the event loop to close without waiting.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }
}

#[async_trait]
impl Transport for Connection {
    async fn transmit(&self, text: String) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();

        self.command_tx
            .send(ConnectionCommand::Transmit { text, ack_tx })
            .map_err(|_| Error::ConnectionClosed)?;

        ack_rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    async fn close(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();

        if self
            .command_tx
            .send(ConnectionCommand::Close { ack_tx })
            .is_err()
        {
            // Already closed.
            return Ok(());
        }

        ack_rx.await.unwrap_or(Ok(()))
    }
}

// ============================================================================
// EventLoop
// ============================================================================

/// Socket owner for one [`Connection`].
pub struct EventLoop<S> {
    ws_stream: WebSocketStream<S>,
    command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
}

impl<S> EventLoop<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Spawns the event loop, delivering inbound traffic to `endpoint`.
    ///
    /// The loop holds only a weak reference; it shuts the connection down
    /// once the endpoint is dropped.
    pub fn spawn(self, endpoint: Weak<dyn Endpoint>) -> JoinHandle<()> {
        tokio::spawn(self.run(endpoint))
    }

    async fn run(self, endpoint: Weak<dyn Endpoint>) {
        let Self {
            ws_stream,
            mut command_rx,
        } = self;
        let (mut ws_write, mut ws_read) = ws_stream.split();

        if let Some(endpoint) = endpoint.upgrade() {
            endpoint.on_open();
        }

        loop {
            tokio::select! {
                // Incoming frames from the peer
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            let Some(target) = endpoint.upgrade() else {
                                debug!("Endpoint dropped, closing connection");
                                let _ = ws_write.close().await;
                                break;
                            };

                            if let Err(e) = target.on_message(text.as_str().to_owned()) {
                                target.on_error(&e);
                                if let Err(close_err) = ws_write.close().await {
                                    error!(error = %close_err, "Failed to close connection after error");
                                }
                                break;
                            }
                        }

                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            let e = Error::WebSocket(e);
                            if let Some(target) = endpoint.upgrade() {
                                target.on_error(&e);
                            }
                            if let Err(close_err) = ws_write.close().await {
                                error!(error = %close_err, "Failed to close connection after error");
                            }
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        Some(Ok(_)) => {
                            trace!("Ignoring non-text frame");
                        }
                    }
                }

                // Commands from the synchronizer
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Transmit { text, ack_tx }) => {
                            let result = ws_write
                                .send(Message::Text(text.into()))
                                .await
                                .map_err(|e| Error::transport(e.to_string()));
                            trace!(ok = result.is_ok(), "Text frame transmitted");
                            let _ = ack_tx.send(result);
                        }

                        Some(ConnectionCommand::Close { ack_tx }) => {
                            debug!("Close command received");
                            command_rx.close();
                            let result = ws_write.close().await.map_err(Error::from);
                            let _ = ack_tx.send(result);
                            break;
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        if let Some(endpoint) = endpoint.upgrade() {
            endpoint.on_close();
        }

        debug!("Event loop terminated");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::transport::EchoServer;

    const WAIT: Duration = Duration::from_secs(5);

    struct RecordingEndpoint {
        messages: mpsc::UnboundedSender<String>,
        opened: AtomicBool,
        closed: AtomicBool,
        errored: AtomicBool,
        reject: bool,
    }

    impl RecordingEndpoint {
        fn new(reject: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let endpoint = Arc::new(Self {
                messages: tx,
                opened: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                errored: AtomicBool::new(false),
                reject,
            });
            (endpoint, rx)
        }
    }

    impl Endpoint for RecordingEndpoint {
        fn on_open(&self) {
            self.opened.store(true, Ordering::SeqCst);
        }

        fn on_message(&self, text: String) -> Result<()> {
            let _ = self.messages.send(text);
            if self.reject {
                return Err(Error::faulted("rejected"));
            }
            Ok(())
        }

        fn on_close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn on_error(&self, _error: &Error) {
            self.errored.store(true, Ordering::SeqCst);
        }
    }

    async fn echo_url() -> Url {
        let server = EchoServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
            .await
            .expect("bind should succeed");
        let url = Url::parse(&server.ws_url()).expect("valid url");
        server.spawn();
        url
    }

    #[tokio::test]
    async fn test_transmit_and_receive_echo() {
        let url = echo_url().await;
        let (connection, event_loop) = Connection::connect(&url, WAIT).await.unwrap();

        let (endpoint, mut messages) = RecordingEndpoint::new(false);
        let weak: Weak<dyn Endpoint> = Arc::downgrade(&endpoint) as Weak<dyn Endpoint>;
        let handle = event_loop.spawn(weak);

        connection.transmit("hello".into()).await.unwrap();
        let echoed = timeout(WAIT, messages.recv()).await.unwrap().unwrap();
        assert_eq!(echoed, "hello");
        assert!(endpoint.opened.load(Ordering::SeqCst));

        connection.close().await.unwrap();
        handle.await.unwrap();
        assert!(endpoint.closed.load(Ordering::SeqCst));
        assert!(connection.is_closed());
    }

    #[tokio::test]
    async fn test_callback_error_closes_connection() {
        let url = echo_url().await;
        let (connection, event_loop) = Connection::connect(&url, WAIT).await.unwrap();

        let (endpoint, mut messages) = RecordingEndpoint::new(true);
        let weak: Weak<dyn Endpoint> = Arc::downgrade(&endpoint) as Weak<dyn Endpoint>;
        let handle = event_loop.spawn(weak);

        connection.transmit("boom".into()).await.unwrap();
        assert_eq!(timeout(WAIT, messages.recv()).await.unwrap().unwrap(), "boom");

        timeout(WAIT, handle).await.unwrap().unwrap();
        assert!(endpoint.errored.load(Ordering::SeqCst));
        assert!(endpoint.closed.load(Ordering::SeqCst));

        let err = connection.transmit("after".into()).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_close_twice_is_noop() {
        let url = echo_url().await;
        let (connection, event_loop) = Connection::connect(&url, WAIT).await.unwrap();

        let (endpoint, _messages) = RecordingEndpoint::new(false);
        let weak: Weak<dyn Endpoint> = Arc::downgrade(&endpoint) as Weak<dyn Endpoint>;
        let handle = event_loop.spawn(weak);

        connection.close().await.unwrap();
        handle.await.unwrap();
        connection.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to find a port nobody listens on.
        let server = EchoServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
            .await
            .unwrap();
        let url = Url::parse(&server.ws_url()).unwrap();
        drop(server);

        let result = Connection::connect(&url, WAIT).await;
        assert!(matches!(result, Err(Error::Connection { .. })));
    }
}
