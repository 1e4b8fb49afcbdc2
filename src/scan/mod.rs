//! Scan sessions - one accepted event per arm cycle.
//!
//! A [`ScanSession`] drives the pure [`ScanMachine`] on the tokio runtime:
//! - decode events are offered with [`ScanSession::on_decode`]; only an armed
//!   session accepts one, and resolution runs in a spawned task so capture is
//!   never blocked
//! - a successful resolution is delivered exactly once on the outcome channel
//! - a failed resolution starts a cancellable cooldown timer
//! - state changes are published on a `watch` channel for UI binding
//!
//! The same session type serves tool lookup and badge capture; only the
//! [`ScanResolver`] differs.

mod machine;
mod resolvers;

pub use machine::{Attempt, Resolution, ScanMachine, ScanNotice, ScanState};
pub use resolvers::{BadgeResolver, ScanResolver, ToolLookupResolver};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::types::{Error, ScanConfig};

/// State snapshot published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSnapshot {
    pub state: ScanState,
    pub notice: Option<ScanNotice>,
    /// When the running countdown re-arms the session.
    pub cooldown_until: Option<Instant>,
}

/// A resolved scan handed to the caller.
#[derive(Debug, Clone)]
pub struct ScanAccepted<T> {
    pub attempt: u64,
    pub raw: String,
    pub output: T,
}

#[derive(Debug)]
struct Guarded {
    machine: ScanMachine,
    cooldown_timer: Option<CancellationToken>,
    cooldown_until: Option<Instant>,
}

impl Guarded {
    fn cancel_timer(&mut self) {
        if let Some(token) = self.cooldown_timer.take() {
            token.cancel();
        }
        self.cooldown_until = None;
    }

    fn snapshot(&self) -> ScanSnapshot {
        ScanSnapshot {
            state: self.machine.state(),
            notice: self.machine.notice().cloned(),
            cooldown_until: self.cooldown_until,
        }
    }
}

struct SessionInner<R: ScanResolver> {
    name: &'static str,
    guarded: Mutex<Guarded>,
    resolver: R,
    cooldown: Duration,
    state_tx: watch::Sender<ScanSnapshot>,
    outcome_tx: mpsc::UnboundedSender<ScanAccepted<R::Output>>,
}

impl<R: ScanResolver> SessionInner<R> {
    fn publish(&self, guarded: &Guarded) {
        self.state_tx.send_replace(guarded.snapshot());
    }
}

/// Debounced scan session parameterized by its resolver.
pub struct ScanSession<R: ScanResolver> {
    inner: Arc<SessionInner<R>>,
}

impl<R: ScanResolver> Clone for ScanSession<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: ScanResolver> fmt::Debug for ScanSession<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanSession")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("cooldown", &self.inner.cooldown)
            .finish_non_exhaustive()
    }
}

impl<R: ScanResolver> ScanSession<R> {
    /// Create an idle session and the receiver for accepted scans.
    pub fn new(
        name: &'static str,
        resolver: R,
        config: &ScanConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ScanAccepted<R::Output>>) {
        let guarded = Guarded {
            machine: ScanMachine::new(),
            cooldown_timer: None,
            cooldown_until: None,
        };
        let (state_tx, _) = watch::channel(guarded.snapshot());
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();

        let session = Self {
            inner: Arc::new(SessionInner {
                name,
                guarded: Mutex::new(guarded),
                resolver,
                cooldown: config.cooldown,
                state_tx,
                outcome_tx,
            }),
        };
        (session, outcome_rx)
    }

    /// Current state.
    pub fn state(&self) -> ScanState {
        self.inner.state_tx.borrow().state
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> ScanSnapshot {
        self.inner.state_tx.borrow().clone()
    }

    /// State-changed notifications.
    pub fn subscribe(&self) -> watch::Receiver<ScanSnapshot> {
        self.inner.state_tx.subscribe()
    }

    /// Capture surface gained focus: arm, dropping any cooldown.
    pub async fn start(&self) {
        let mut guarded = self.inner.guarded.lock().await;
        guarded.cancel_timer();
        guarded.machine.start();
        tracing::debug!(session = self.inner.name, "scan_armed");
        self.inner.publish(&guarded);
    }

    /// Capture surface lost focus: go idle, cancelling timers. An in-flight
    /// resolution still completes store-side but no longer affects the session.
    pub async fn suspend(&self) {
        let mut guarded = self.inner.guarded.lock().await;
        guarded.cancel_timer();
        guarded.machine.suspend();
        tracing::debug!(session = self.inner.name, "scan_suspended");
        self.inner.publish(&guarded);
    }

    /// User chose to scan again during a cooldown.
    pub async fn retry(&self) -> bool {
        let mut guarded = self.inner.guarded.lock().await;
        if !guarded.machine.retry() {
            return false;
        }
        guarded.cancel_timer();
        tracing::debug!(session = self.inner.name, "scan_retry");
        self.inner.publish(&guarded);
        true
    }

    /// Hide the cooldown notification.
    pub async fn dismiss_notice(&self) -> bool {
        let mut guarded = self.inner.guarded.lock().await;
        let changed = guarded.machine.dismiss_notice();
        if changed {
            self.inner.publish(&guarded);
        }
        changed
    }

    /// Offer a decode event. Returns whether it was accepted for resolution.
    pub async fn on_decode(&self, raw: &str) -> bool {
        let attempt = {
            let mut guarded = self.inner.guarded.lock().await;
            let Some(attempt) = guarded.machine.on_decode(raw) else {
                tracing::trace!(session = self.inner.name, "scan_decode_ignored");
                return false;
            };
            self.inner.publish(&guarded);
            attempt
        };

        tracing::debug!(session = self.inner.name, attempt = attempt.id, "scan_locked");
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = inner.resolver.resolve(&attempt.raw).await;
            Self::complete(inner, attempt, result).await;
        });
        true
    }

    async fn complete(
        inner: Arc<SessionInner<R>>,
        attempt: Attempt,
        result: crate::types::Result<R::Output>,
    ) {
        let mut guarded = inner.guarded.lock().await;
        match result {
            Ok(output) => {
                if guarded.machine.resolve_ok(attempt.id) == Resolution::Stale {
                    tracing::debug!(session = inner.name, attempt = attempt.id, "scan_result_stale");
                    return;
                }
                tracing::info!(session = inner.name, attempt = attempt.id, "scan_accepted");
                inner.publish(&guarded);
                let accepted = ScanAccepted {
                    attempt: attempt.id,
                    raw: attempt.raw,
                    output,
                };
                if inner.outcome_tx.send(accepted).is_err() {
                    tracing::warn!(session = inner.name, "scan_outcome_receiver_dropped");
                }
            }
            Err(error) => {
                let Resolution::CoolDown { epoch } = guarded.machine.resolve_err(attempt.id, &error)
                else {
                    tracing::debug!(session = inner.name, attempt = attempt.id, "scan_result_stale");
                    return;
                };
                tracing::warn!(
                    session = inner.name,
                    attempt = attempt.id,
                    raw = %attempt.raw,
                    error = %error,
                    "scan_rejected"
                );
                Self::start_cooldown(&inner, &mut guarded, epoch);
                inner.publish(&guarded);
            }
        }
    }

    fn start_cooldown(inner: &Arc<SessionInner<R>>, guarded: &mut Guarded, epoch: u64) {
        guarded.cancel_timer();
        let token = CancellationToken::new();
        let deadline = Instant::now() + inner.cooldown;
        guarded.cooldown_timer = Some(token.clone());
        guarded.cooldown_until = Some(deadline);

        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    let mut guarded = inner.guarded.lock().await;
                    if guarded.machine.cooldown_elapsed(epoch) {
                        guarded.cooldown_timer = None;
                        guarded.cooldown_until = None;
                        let timeout = Error::timeout(format!(
                            "no retry within {:?}",
                            inner.cooldown
                        ));
                        tracing::info!(session = inner.name, reason = %timeout, "scan_rearmed");
                        inner.publish(&guarded);
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::badge::{AcceptedBadges, BadgeGate, BadgeVerdict};
    use crate::types::ErrorKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Resolver that counts calls, waits, then accepts codes starting with "ok".
    struct Counting {
        calls: Arc<AtomicUsize>,
        delay: Duration,
    }

    #[async_trait]
    impl ScanResolver for Counting {
        type Output = String;

        async fn resolve(&self, raw: &str) -> crate::types::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if raw.starts_with("ok") {
                Ok(raw.to_uppercase())
            } else {
                Err(Error::invalid_format(raw.to_string()))
            }
        }
    }

    fn counting(delay_ms: u64) -> (Counting, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Counting {
                calls: calls.clone(),
                delay: Duration::from_millis(delay_ms),
            },
            calls,
        )
    }

    async fn wait_for(rx: &mut watch::Receiver<ScanSnapshot>, state: ScanState) {
        let wait = rx.wait_for(|snap| snap.state == state);
        tokio::time::timeout(Duration::from_secs(60), wait)
            .await
            .expect("state reached before timeout")
            .expect("session alive");
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_decodes_50ms_apart_resolve_once() {
        let (resolver, calls) = counting(200);
        let (session, mut outcomes) = ScanSession::new("tool", resolver, &ScanConfig::default());
        session.start().await;

        assert!(session.on_decode("ok-1").await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!session.on_decode("ok-1").await);

        let accepted = outcomes.recv().await.unwrap();
        assert_eq!(accepted.output, "OK-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.state(), ScanState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_auto_clears() {
        let gate = BadgeGate::new(AcceptedBadges::new(["123456789"]));
        assert_eq!(gate.validate("000000000"), BadgeVerdict::Unauthorized);
        let (session, _outcomes) =
            ScanSession::new("badge", BadgeResolver::new(gate), &ScanConfig::default());
        let mut rx = session.subscribe();
        session.start().await;

        let started = Instant::now();
        session.on_decode("000000000").await;
        wait_for(&mut rx, ScanState::CoolingDown).await;
        let notice = session.snapshot().notice.unwrap();
        assert_eq!(notice.raw, "000000000");
        assert_eq!(notice.kind, ErrorKind::Unauthorized);

        wait_for(&mut rx, ScanState::Armed).await;
        assert!(started.elapsed() >= Duration::from_millis(7000));
        assert!(session.snapshot().notice.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_rearms_immediately() {
        let (resolver, _calls) = counting(0);
        let (session, _outcomes) = ScanSession::new("tool", resolver, &ScanConfig::default());
        let mut rx = session.subscribe();
        session.start().await;

        session.on_decode("bad").await;
        wait_for(&mut rx, ScanState::CoolingDown).await;
        assert!(session.snapshot().cooldown_until.is_some());

        assert!(session.retry().await);
        assert_eq!(session.state(), ScanState::Armed);
        assert!(session.snapshot().cooldown_until.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_result_after_suspend_is_discarded() {
        let (resolver, calls) = counting(500);
        let (session, mut outcomes) = ScanSession::new("tool", resolver, &ScanConfig::default());
        session.start().await;

        session.on_decode("ok-1").await;
        session.suspend().await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.state(), ScanState::Idle);
        assert!(outcomes.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspend_cancels_cooldown_and_start_is_clean() {
        let (resolver, _calls) = counting(0);
        let (session, _outcomes) = ScanSession::new("tool", resolver, &ScanConfig::default());
        let mut rx = session.subscribe();
        session.start().await;

        session.on_decode("bad").await;
        wait_for(&mut rx, ScanState::CoolingDown).await;
        session.suspend().await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(session.state(), ScanState::Idle);

        session.start().await;
        let snap = session.snapshot();
        assert_eq!(snap.state, ScanState::Armed);
        assert!(snap.notice.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_notice_keeps_suppression() {
        let (resolver, calls) = counting(0);
        let (session, _outcomes) = ScanSession::new("tool", resolver, &ScanConfig::default());
        let mut rx = session.subscribe();
        session.start().await;

        session.on_decode("bad").await;
        wait_for(&mut rx, ScanState::CoolingDown).await;
        assert!(session.dismiss_notice().await);
        assert!(!session.on_decode("ok-2").await);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(session.snapshot().notice.unwrap().dismissed);
    }
}
