//! Half-duplex synchronizer state machine.
//!
//! Wraps a [`Transport`] and turns it into a strict ping-pong channel:
//! one [`Synchronizer::send`], then one [`Synchronizer::receive`], repeated.
//!
//! # State Machine
//!
//! | Phase | send | receive | message arrives |
//! |-------|------|---------|-----------------|
//! | `ExpectingSend` | → `ExpectingReceive`, arm, transmit | protocol violation | → `Faulted` |
//! | `ExpectingReceive` | protocol violation | wait → `ExpectingSend` | release signal |
//! | `Faulted` | faulted | faulted | faulted |
//!
//! # Known Weakness
//!
//! [`Synchronizer::receive`] checks the phase before it starts waiting and
//! does not re-validate it while suspended. The lock serializes only the
//! check-and-flip; concurrent callers issuing overlapping exchanges get no
//! ordering guarantee.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::transport::{Endpoint, Transport};

use super::phase::{Phase, TimeoutPolicy};
use super::signal::{Release, Wait, arm};

// ============================================================================
// Constants
// ============================================================================

/// Default bound on a receive.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// ExchangeState
// ============================================================================

/// Lock-protected state.
#[derive(Debug, Default)]
struct ExchangeState {
    phase: Phase,
    /// Release side of the armed signal; taken by the arrival callback.
    release: Option<Release<String>>,
    /// Wait side of the armed signal; taken by receive.
    wait: Option<Wait<String>>,
    /// Number of exchanges started.
    exchange: u64,
    fault: Option<String>,
}

impl ExchangeState {
    /// Fails unless the phase is `expected`.
    fn ensure(&self, expected: Phase) -> Result<()> {
        match self.phase {
            phase if phase == expected => Ok(()),
            Phase::Faulted => Err(self.faulted_error()),
            Phase::ExpectingReceive => Err(Error::unexpected_send()),
            Phase::ExpectingSend => Err(Error::unexpected_receive()),
        }
    }

    fn faulted_error(&self) -> Error {
        Error::faulted(self.fault.as_deref().unwrap_or("unsolicited message"))
    }

    /// Drops the armed signal and returns to `ExpectingSend`.
    fn abandon_exchange(&mut self) {
        self.phase = Phase::ExpectingSend;
        self.release = None;
        self.wait = None;
    }

    /// Poisons the state permanently.
    fn fault(&mut self, reason: &str) -> Error {
        self.phase = Phase::Faulted;
        self.release = None;
        self.wait = None;
        self.fault = Some(reason.to_string());

        error!(exchange = self.exchange, reason, "Synchronizer faulted");

        Error::faulted(reason)
    }
}

// ============================================================================
// PendingWait
// ============================================================================

/// A wait taken out of the state for the duration of a receive.
///
/// Puts the wait back if the receive future is dropped or times out.
struct PendingWait<'a> {
    state: &'a Mutex<ExchangeState>,
    exchange: u64,
    wait: Option<Wait<String>>,
}

impl PendingWait<'_> {
    async fn wait_for(&mut self, receive_timeout: Duration) -> Result<String> {
        let Some(wait) = self.wait.as_mut() else {
            return Err(Error::unexpected_receive());
        };

        let outcome = wait.wait_for(receive_timeout).await;

        // Only a timeout leaves the wait reusable.
        if !matches!(outcome, Err(Error::Timeout { .. })) {
            self.wait = None;
        }

        outcome
    }
}

impl Drop for PendingWait<'_> {
    fn drop(&mut self) {
        let Some(wait) = self.wait.take() else {
            return;
        };

        let mut state = self.state.lock();
        if state.exchange == self.exchange
            && state.phase == Phase::ExpectingReceive
            && state.wait.is_none()
        {
            state.wait = Some(wait);
        }
    }
}

// ============================================================================
// Synchronizer
// ============================================================================

/// Half-duplex request/response synchronizer.
///
/// One instance per connection. Starts in [`Phase::ExpectingSend`].
///
/// # Thread Safety
///
/// `Synchronizer` is `Send + Sync`. The application drives
/// [`send`](Self::send) and [`receive`](Self::receive) from one task while
/// the transport calls [`on_message_arrived`](Self::on_message_arrived) from
/// its own.
pub struct Synchronizer<T> {
    transport: T,
    state: Mutex<ExchangeState>,
    timeout_policy: TimeoutPolicy,
}

impl<T: Transport> Synchronizer<T> {
    /// Creates a synchronizer over `transport`.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self::with_timeout_policy(transport, TimeoutPolicy::default())
    }

    /// Creates a synchronizer with an explicit timeout policy.
    #[must_use]
    pub fn with_timeout_policy(transport: T, timeout_policy: TimeoutPolicy) -> Self {
        Self {
            transport,
            state: Mutex::new(ExchangeState::default()),
            timeout_policy,
        }
    }

    /// Returns the current phase.
    #[inline]
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// Returns the number of exchanges started so far.
    #[inline]
    #[must_use]
    pub fn exchange_count(&self) -> u64 {
        self.state.lock().exchange
    }

    /// Returns why the synchronizer faulted, if it did.
    #[must_use]
    pub fn fault_reason(&self) -> Option<String> {
        self.state.lock().fault.clone()
    }

    /// Returns the timeout policy.
    #[inline]
    #[must_use]
    pub fn timeout_policy(&self) -> TimeoutPolicy {
        self.timeout_policy
    }

    /// Returns the underlying transport.
    #[inline]
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends one message and opens an exchange.
    ///
    /// The signal for the reply is armed before the message leaves, so a
    /// reply delivered immediately is never missed.
    ///
    /// # Errors
    ///
    /// - [`Error::ProtocolViolation`] if a receive is expected
    /// - [`Error::Transport`] if transmission fails; the phase reverts
    /// - [`Error::Faulted`] if the synchronizer is poisoned
    pub async fn send(&self, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        info!(payload = %message, "Sending");

        let exchange = {
            let mut state = self.state.lock();
            if let Err(e) = state.ensure(Phase::ExpectingSend) {
                warn!(error = %e, "Send rejected");
                return Err(e);
            }

            let (release, wait) = arm();
            state.phase = Phase::ExpectingReceive;
            state.release = Some(release);
            state.wait = Some(wait);
            state.exchange += 1;
            state.exchange
        };

        if let Err(e) = self.transport.transmit(message).await {
            let mut state = self.state.lock();
            if state.exchange == exchange && state.phase == Phase::ExpectingReceive {
                state.abandon_exchange();
            }

            error!(exchange, error = %e, "Transmit failed");

            return Err(match e {
                Error::Transport { .. } => e,
                other => Error::transport(other.to_string()),
            });
        }

        Ok(())
    }

    /// Waits for the reply to the last send.
    ///
    /// # Errors
    ///
    /// - [`Error::ProtocolViolation`] if a send is expected
    /// - [`Error::Timeout`] if no reply arrives within `receive_timeout`
    /// - [`Error::Interrupted`] if the connection went away mid-exchange
    /// - [`Error::Faulted`] if the synchronizer is poisoned
    pub async fn receive(&self, receive_timeout: Duration) -> Result<String> {
        let timeout_ms = receive_timeout.as_millis() as u64;
        info!(timeout_ms, "Requested receive");

        let (wait, exchange) = {
            let mut state = self.state.lock();
            if let Err(e) = state.ensure(Phase::ExpectingReceive) {
                warn!(error = %e, "Receive rejected");
                return Err(e);
            }

            let Some(wait) = state.wait.take() else {
                let e = Error::protocol_violation("another receive is already waiting");
                warn!(error = %e, "Receive rejected");
                return Err(e);
            };

            (wait, state.exchange)
        };

        let mut pending = PendingWait {
            state: &self.state,
            exchange,
            wait: Some(wait),
        };
        let outcome = pending.wait_for(receive_timeout).await;
        drop(pending);

        let mut state = self.state.lock();
        if state.phase.is_faulted() {
            return Err(state.faulted_error());
        }

        match outcome {
            Ok(payload) => {
                if state.exchange == exchange {
                    state.phase = Phase::ExpectingSend;
                }
                info!(exchange, payload = %payload, "Received");
                Ok(payload)
            }

            Err(e) if e.is_timeout() => {
                if self.timeout_policy == TimeoutPolicy::ResetToSend && state.exchange == exchange
                {
                    state.abandon_exchange();
                }
                warn!(exchange, timeout_ms, phase = %state.phase, "Receive timed out");
                Err(e)
            }

            Err(e) => {
                // The release side is gone; no reply can arrive for this exchange.
                if state.exchange == exchange {
                    state.abandon_exchange();
                }
                warn!(exchange, error = %e, "Receive interrupted");
                Err(e)
            }
        }
    }

    /// Delivers an inbound message.
    ///
    /// Called by the transport, possibly from another thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Faulted`] if the message was unsolicited. The
    /// synchronizer stays faulted for the rest of its life.
    pub fn on_message_arrived(&self, message: String) -> Result<()> {
        info!(payload = %message, "Receiving");

        let mut state = self.state.lock();
        match state.phase {
            Phase::Faulted => Err(state.faulted_error()),

            Phase::ExpectingSend => Err(state.fault("did not expect to receive message")),

            Phase::ExpectingReceive => match state.release.take() {
                Some(release) => {
                    if release.release(message).is_err() {
                        warn!(exchange = state.exchange, "Reply arrived after its receiver was dropped");
                    }
                    Ok(())
                }
                None => Err(state.fault("received more than one reply for one exchange")),
            },
        }
    }

    /// Closes the underlying transport.
    ///
    /// # Errors
    ///
    /// Propagates the transport's close error.
    pub async fn close(&self) -> Result<()> {
        self.transport.close().await
    }
}

// ============================================================================
// Endpoint
// ============================================================================

impl<T: Transport> Endpoint for Synchronizer<T> {
    fn on_open(&self) {
        info!("Session opened");
    }

    fn on_message(&self, text: String) -> Result<()> {
        self.on_message_arrived(text)
    }

    fn on_close(&self) {
        info!("Session closed");
        // Wakes a pending receive with Interrupted.
        self.state.lock().release = None;
    }

    fn on_error(&self, error: &Error) {
        error!(error = %error, "WebSocket error");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;

    use async_trait::async_trait;
    use proptest::prelude::*;

    #[derive(Default)]
    struct MockTransport {
        sent: Mutex<Vec<String>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn transmit(&self, text: String) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::ConnectionClosed);
            }
            self.sent.lock().push(text);
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn synchronizer() -> Arc<Synchronizer<MockTransport>> {
        Arc::new(Synchronizer::new(MockTransport::default()))
    }

    fn reply_after(sync: &Arc<Synchronizer<MockTransport>>, payload: &str, delay: Duration) {
        let sync = Arc::clone(sync);
        let payload = payload.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = sync.on_message_arrived(payload);
        });
    }

    #[tokio::test]
    async fn test_hello_world_round_trip() {
        let sync = synchronizer();

        sync.send("Hello, World!").await.unwrap();
        reply_after(&sync, "Hello, World!", Duration::from_millis(10));

        let reply = sync.receive(DEFAULT_RECEIVE_TIMEOUT).await.unwrap();
        assert_eq!(reply, "Hello, World!");
        assert_eq!(sync.phase(), Phase::ExpectingSend);
        assert_eq!(*sync.transport().sent.lock(), vec!["Hello, World!".to_string()]);
    }

    #[tokio::test]
    async fn test_send_twice_is_violation() {
        let sync = synchronizer();

        sync.send("first").await.unwrap();
        let err = sync.send("second").await.unwrap_err();

        assert!(err.is_protocol_violation());
        assert_eq!(sync.phase(), Phase::ExpectingReceive);
        assert_eq!(sync.transport().sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_receive_before_send_is_violation() {
        let sync = synchronizer();

        let err = sync.receive(Duration::from_millis(10)).await.unwrap_err();
        assert!(err.is_protocol_violation());
        assert_eq!(sync.phase(), Phase::ExpectingSend);
    }

    #[tokio::test]
    async fn test_unsolicited_message_faults() {
        let sync = synchronizer();

        let err = sync.on_message_arrived("surprise".into()).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(sync.phase(), Phase::Faulted);
        assert!(sync.fault_reason().is_some());

        assert!(sync.send("after").await.unwrap_err().is_fatal());
        assert!(sync.receive(Duration::from_millis(10)).await.unwrap_err().is_fatal());
        assert!(sync.on_message_arrived("again".into()).unwrap_err().is_fatal());
    }

    #[tokio::test]
    async fn test_second_reply_faults() {
        let sync = synchronizer();

        sync.send("ping").await.unwrap();
        sync.on_message_arrived("pong".into()).unwrap();

        let err = sync.on_message_arrived("pong again".into()).unwrap_err();
        assert!(err.is_fatal());
        assert!(sync.receive(Duration::from_millis(10)).await.unwrap_err().is_fatal());
    }

    #[tokio::test]
    async fn test_timeout_shorter_than_delay() {
        let sync = synchronizer();

        sync.send("slow").await.unwrap();
        reply_after(&sync, "late", Duration::from_millis(200));

        let err = sync.receive(Duration::from_millis(20)).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_timeout_longer_than_delay() {
        let sync = synchronizer();

        sync.send("quick").await.unwrap();
        reply_after(&sync, "reply", Duration::from_millis(20));

        let reply = sync.receive(Duration::from_secs(5)).await.unwrap();
        assert_eq!(reply, "reply");
    }

    #[tokio::test]
    async fn test_no_reply_times_out_on_schedule() {
        let sync = synchronizer();
        sync.send("ping").await.unwrap();

        let start = Instant::now();
        let err = sync.receive(Duration::from_millis(100)).await.unwrap_err();
        let elapsed = start.elapsed();

        assert!(err.is_timeout());
        assert!(elapsed >= Duration::from_millis(90), "returned too early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(5), "returned too late: {elapsed:?}");
    }

    #[tokio::test]
    async fn test_timeout_keeps_expecting_receive() {
        let sync = synchronizer();
        sync.send("ping").await.unwrap();

        assert!(sync.receive(Duration::from_millis(10)).await.unwrap_err().is_timeout());
        assert_eq!(sync.phase(), Phase::ExpectingReceive);
        assert!(sync.send("retry").await.unwrap_err().is_protocol_violation());

        // The late reply is still collected by the next receive.
        sync.on_message_arrived("pong".into()).unwrap();
        assert_eq!(sync.receive(Duration::from_secs(1)).await.unwrap(), "pong");
        assert_eq!(sync.phase(), Phase::ExpectingSend);
    }

    #[tokio::test]
    async fn test_timeout_reset_to_send() {
        let sync = Synchronizer::with_timeout_policy(
            MockTransport::default(),
            TimeoutPolicy::ResetToSend,
        );
        sync.send("ping").await.unwrap();

        assert!(sync.receive(Duration::from_millis(10)).await.unwrap_err().is_timeout());
        assert_eq!(sync.phase(), Phase::ExpectingSend);

        sync.send("retry").await.unwrap();
        sync.on_message_arrived("pong".into()).unwrap();
        assert_eq!(sync.receive(Duration::from_secs(1)).await.unwrap(), "pong");
    }

    #[tokio::test]
    async fn test_late_reply_after_reset_faults() {
        let sync = Synchronizer::with_timeout_policy(
            MockTransport::default(),
            TimeoutPolicy::ResetToSend,
        );
        sync.send("ping").await.unwrap();
        assert!(sync.receive(Duration::from_millis(10)).await.unwrap_err().is_timeout());

        assert!(sync.on_message_arrived("late".into()).unwrap_err().is_fatal());
        assert_eq!(sync.phase(), Phase::Faulted);
    }

    #[tokio::test]
    async fn test_sequential_exchanges_do_not_mix() {
        let sync = synchronizer();

        sync.send("a").await.unwrap();
        reply_after(&sync, "reply-a", Duration::from_millis(5));
        assert_eq!(sync.receive(Duration::from_secs(1)).await.unwrap(), "reply-a");

        sync.send("b").await.unwrap();
        reply_after(&sync, "reply-b", Duration::from_millis(5));
        assert_eq!(sync.receive(Duration::from_secs(1)).await.unwrap(), "reply-b");

        assert_eq!(sync.exchange_count(), 2);
    }

    #[tokio::test]
    async fn test_transmit_failure_reverts_phase() {
        let sync = synchronizer();
        sync.transport().fail.store(true, Ordering::SeqCst);

        let err = sync.send("lost").await.unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
        assert_eq!(sync.phase(), Phase::ExpectingSend);

        sync.transport().fail.store(false, Ordering::SeqCst);
        sync.send("retry").await.unwrap();
        assert_eq!(sync.phase(), Phase::ExpectingReceive);
    }

    #[tokio::test]
    async fn test_close_interrupts_pending_receive() {
        let sync = synchronizer();
        sync.send("ping").await.unwrap();

        let closer = Arc::clone(&sync);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            closer.on_close();
        });

        let err = sync.receive(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, Error::Interrupted(_)));
        assert_eq!(sync.phase(), Phase::ExpectingSend);
    }

    #[tokio::test]
    async fn test_dropped_receive_keeps_exchange() {
        let sync = synchronizer();
        sync.send("ping").await.unwrap();

        tokio::select! {
            _ = sync.receive(Duration::from_secs(5)) => panic!("no reply was sent"),
            _ = tokio::time::sleep(Duration::from_millis(10)) => {}
        }

        sync.on_message_arrived("pong".into()).unwrap();
        assert_eq!(sync.receive(Duration::from_secs(1)).await.unwrap(), "pong");
    }

    #[tokio::test]
    async fn test_concurrent_receive_is_violation() {
        let sync = synchronizer();
        sync.send("ping").await.unwrap();

        let waiter = Arc::clone(&sync);
        let first = tokio::spawn(async move { waiter.receive(Duration::from_secs(5)).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let err = sync.receive(Duration::from_millis(10)).await.unwrap_err();
        assert!(err.is_protocol_violation());

        sync.on_message_arrived("pong".into()).unwrap();
        assert_eq!(first.await.unwrap().unwrap(), "pong");
    }

    /// Answers from inside `transmit`, before `send` has returned.
    struct ImmediateReply {
        peer: std::sync::Weak<Synchronizer<ImmediateReply>>,
    }

    #[async_trait]
    impl Transport for ImmediateReply {
        async fn transmit(&self, text: String) -> Result<()> {
            if let Some(peer) = self.peer.upgrade() {
                peer.on_message_arrived(format!("echo: {text}"))?;
            }
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_reply_during_transmit_is_not_missed() {
        let sync = Arc::new_cyclic(|weak| Synchronizer::new(ImmediateReply { peer: weak.clone() }));

        sync.send("fast").await.unwrap();
        assert_eq!(sync.receive(Duration::from_millis(50)).await.unwrap(), "echo: fast");
    }

    proptest! {
        #[test]
        fn prop_each_receive_returns_its_reply(payloads in prop::collection::vec(".{0,32}", 1..16)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();

            rt.block_on(async {
                let sync = Synchronizer::new(MockTransport::default());
                for (i, payload) in payloads.iter().enumerate() {
                    sync.send(format!("request {i}")).await.unwrap();
                    sync.on_message_arrived(payload.clone()).unwrap();
                    assert_eq!(&sync.receive(Duration::from_secs(1)).await.unwrap(), payload);
                }
                assert_eq!(sync.exchange_count(), payloads.len() as u64);
            });
        }
    }
}
