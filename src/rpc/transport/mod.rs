//! Transport abstraction and implementations
//!
//! This module defines the [`Transport`] trait that all fleet transport
//! implementations must satisfy. Concrete implementations live in
//! submodules:
//!
//! - [`stdio::StdioTransport`] -- newline-delimited JSON over the stdio
//!   pipes of a supervised child process.
//! - [`http::HttpTransport`] -- one HTTP POST per message against a remote
//!   endpoint.
//! - [`fake::FakeTransport`] -- in-process fake used in tests (cfg(test)
//!   only).
//!
//! # Design
//!
//! The trait is intentionally minimal: callers `send` a serialized JSON-RPC
//! string and `receive` a stream of serialized JSON-RPC strings (one per
//! logical message). Framing is the responsibility of each implementation.
//!
//! The `receive_err` stream carries transport-level diagnostics (stderr
//! output from a child process). Diagnostic output is log-only and is never
//! fed into request correlation.

use std::pin::Pin;

use futures::Stream;

use crate::error::Result;

/// Abstraction over fleet transport implementations.
///
/// Implementations exist for stdio (supervised child process) and HTTP.
/// A [`fake::FakeTransport`] is provided for tests.
///
/// All methods are `async` or return pinned [`Stream`]s so that transport
/// implementations can drive I/O without blocking the Tokio executor.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Send a complete JSON-RPC message string to the remote peer.
    ///
    /// The string MUST be a single, complete JSON object. The transport is
    /// responsible for any framing required by the underlying medium (e.g.
    /// appending a newline for stdio, or issuing an HTTP POST).
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::FleetError::Transport`] if the underlying
    /// I/O operation fails.
    async fn send(&self, message: String) -> Result<()>;

    /// Returns a stream of inbound JSON-RPC message strings.
    ///
    /// Each item is a single, complete JSON object with leading/trailing
    /// whitespace stripped. The stream ends when the transport is closed or
    /// the remote peer disconnects.
    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>>;

    /// Returns a stream of transport-level diagnostic strings.
    ///
    /// For stdio transports this carries lines written to the child
    /// process's stderr. For HTTP transports this stream may be empty.
    fn receive_err(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>>;
}

pub mod http;
pub mod stdio;

#[cfg(test)]
pub mod fake;
