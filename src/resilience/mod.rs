//! Per-server resilience wrappers
//!
//! Two composable guards protect every call the orchestrator routes to a
//! server:
//!
//! - `breaker` -- a circuit breaker that fails fast once a target has
//!   accumulated too many consecutive failures.
//! - `retry`   -- bounded exponential-backoff retry for transient faults.
//!
//! The orchestrator nests them breaker-outermost:
//! `breaker.execute(|| retry.execute(|| call))`, so an open breaker skips
//! the retry loop entirely, while a retry-exhausted error counts as a
//! single breaker failure.

pub mod breaker;
pub mod retry;

pub use breaker::{BreakerSettings, CircuitBreaker, CircuitState};
pub use retry::RetryWithBackoff;
