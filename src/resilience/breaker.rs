//! Per-target circuit breaker
//!
//! A [`CircuitBreaker`] tracks consecutive failures against one target and
//! fails fast once the target looks unhealthy, protecting both the caller
//! (no pointless waits) and the callee (no pile-on while it recovers).
//!
//! # State machine
//!
//! - **Closed** (initial): calls pass through. Success resets the failure
//!   counter; failure increments it, and reaching `failure_threshold`
//!   transitions to Open, recording the opening time.
//! - **Open**: every call is rejected immediately with
//!   [`FleetError::BreakerOpen`] without invoking the wrapped operation.
//!   Once `reset_timeout` has elapsed, the next call is admitted as a
//!   half-open probe; the elapsed check happens lazily on `execute` rather
//!   than via a timer task (both satisfy the same contract).
//! - **HalfOpen**: exactly one probe is in flight; concurrent calls are
//!   rejected. Probe success returns to Closed with the counter cleared;
//!   probe failure returns to Open and restarts the reset timer.
//!
//! The wrapped operation is invoked at most once per `execute`, and only in
//! Closed or HalfOpen. State transitions are driven solely by the outcome
//! of that single invocation and the elapsed reset timer.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{FleetError, Result};

/// The breaker's observable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Healthy; calls pass through.
    Closed,
    /// Unhealthy; calls fail fast.
    Open,
    /// One probe in flight to test recovery.
    HalfOpen,
}

/// Breaker thresholds.
#[derive(Debug, Clone)]
pub struct BreakerSettings {
    /// Consecutive failures in Closed that trip the breaker.
    pub failure_threshold: u32,
    /// How long to stay Open before admitting a probe.
    pub reset_timeout: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
}

/// Failure-tracking state machine guarding one target.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Target name, used in errors and logs.
    target: String,
    settings: BreakerSettings,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a breaker for `target` in the Closed state.
    pub fn new(target: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            target: target.into(),
            settings,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
            }),
        }
    }

    /// The current state, resolving a due Open→HalfOpen transition.
    pub async fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock().await;
        if self.open_elapsed(&inner) {
            // Observing the state after the reset timeout reports HalfOpen,
            // but the probe slot is only claimed by an execute call.
            inner.state = CircuitState::HalfOpen;
        }
        inner.state
    }

    /// Run `op` through the breaker.
    ///
    /// The operation is invoked at most once, and only when the breaker is
    /// Closed or admits this call as the half-open probe. The lock is not
    /// held across the invocation, so concurrent callers observe consistent
    /// state without serializing their operations.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::BreakerOpen`] without invoking `op` when the
    /// breaker is Open (or a probe is already in flight); otherwise
    /// propagates `op`'s own error.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let probe = {
            let mut inner = self.inner.lock().await;
            match inner.state {
                CircuitState::Closed => false,
                CircuitState::Open if self.open_elapsed(&inner) => {
                    tracing::debug!(breaker = %self.target, "breaker half-open, admitting probe");
                    inner.state = CircuitState::HalfOpen;
                    // Claim the probe slot: with opened_at cleared, later
                    // callers in HalfOpen are rejected until this settles.
                    inner.opened_at = None;
                    true
                }
                CircuitState::HalfOpen if inner.opened_at.is_some() => {
                    // state() flipped us to HalfOpen without claiming the
                    // probe slot; nobody is in flight, so this call is it.
                    inner.opened_at = None;
                    true
                }
                CircuitState::Open | CircuitState::HalfOpen => {
                    return Err(anyhow::anyhow!(FleetError::BreakerOpen(
                        self.target.clone()
                    )));
                }
            }
        };

        let outcome = op().await;

        let mut inner = self.inner.lock().await;
        match &outcome {
            Ok(_) => {
                if inner.state != CircuitState::Closed {
                    tracing::info!(breaker = %self.target, "breaker closed after successful probe");
                }
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.opened_at = None;
            }
            Err(e) => {
                if probe {
                    tracing::warn!(breaker = %self.target, "probe failed, breaker re-opened: {e}");
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                } else {
                    inner.failure_count += 1;
                    if inner.failure_count >= self.settings.failure_threshold {
                        tracing::warn!(
                            breaker = %self.target,
                            failures = inner.failure_count,
                            "failure threshold reached, breaker opened"
                        );
                        inner.state = CircuitState::Open;
                        inner.opened_at = Some(Instant::now());
                    }
                }
            }
        }
        outcome
    }

    /// Current consecutive-failure count.
    pub async fn failure_count(&self) -> u32 {
        self.inner.lock().await.failure_count
    }

    /// Whether an Open breaker's reset timeout has elapsed.
    fn open_elapsed(&self, inner: &BreakerInner) -> bool {
        inner.state == CircuitState::Open
            && inner
                .opened_at
                .is_some_and(|at| at.elapsed() >= self.settings.reset_timeout)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
