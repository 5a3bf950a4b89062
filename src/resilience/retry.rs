//! Bounded exponential-backoff retry
//!
//! [`RetryWithBackoff`] wraps a fallible asynchronous operation and retries
//! it a bounded number of times, sleeping between attempts with the delay
//! multiplied by a factor each round. Intermediate failures are logged at
//! warn; only exhaustion surfaces a single aggregate error naming the
//! attempt count and embedding the final attempt's message.

use std::future::Future;
use std::time::Duration;

use crate::error::{FleetError, Result};

/// Retry policy: attempt bound plus backoff curve.
#[derive(Debug, Clone)]
pub struct RetryWithBackoff {
    /// Maximum number of times the operation is invoked.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each attempt.
    pub factor: f64,
}

impl Default for RetryWithBackoff {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            factor: 2.0,
        }
    }
}

impl RetryWithBackoff {
    /// Create a policy.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - How many times to invoke the operation (min 1).
    /// * `initial_delay` - Delay before the second attempt.
    /// * `factor` - Backoff multiplier (`delay_next = delay * factor`).
    pub fn new(max_attempts: u32, initial_delay: Duration, factor: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            factor,
        }
    }

    /// Invoke `op` until it succeeds or the attempt budget is spent.
    ///
    /// Between attempts (never after the last) the current delay is slept,
    /// then multiplied by `factor`. Success on any attempt returns
    /// immediately with no further delay.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::RetryExhausted`] carrying the attempt count
    /// and the final attempt's error message; intermediate failures are
    /// logged, not surfaced.
    pub async fn execute<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = self.initial_delay;
        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 1..=self.max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        "attempt failed: {e}"
                    );
                    last_error = Some(e);
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(delay).await;
                delay = delay.mul_f64(self.factor);
            }
        }

        let last = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        Err(anyhow::anyhow!(FleetError::RetryExhausted {
            attempts: self.max_attempts,
            last_error: last,
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
