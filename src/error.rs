//! Error types for toolfleet
//!
//! This module defines all error types used throughout the crate,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for toolfleet operations
///
/// This enum encompasses all possible errors that can occur during
/// server supervision, transport I/O, request correlation, resilience
/// wrapping, and configuration loading.
#[derive(Error, Debug)]
pub enum FleetError {
    /// Configuration-related errors (parse failures, invalid definitions)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level I/O errors (broken pipe, closed channel, HTTP failure)
    #[error("Transport error [{server}]: {reason}")]
    Transport {
        /// Id of the server whose transport failed
        server: String,
        /// What went wrong
        reason: String,
    },

    /// A correlated request did not receive its response before the deadline
    #[error("Request timeout [{server}]: no response to `{method}`")]
    Timeout {
        /// Id of the server that failed to respond
        server: String,
        /// The JSON-RPC method that timed out
        method: String,
    },

    /// The server returned a JSON-RPC error response
    #[error("Server error [{server}]: {message}")]
    Rpc {
        /// Id of the responding server
        server: String,
        /// JSON-RPC error code
        code: i64,
        /// Human-readable error message from the server
        message: String,
    },

    /// A tool name was not found in the session's cached descriptor set
    #[error("Unknown tool `{tool}` on server `{server}`; available tools: [{available}]")]
    UnknownTool {
        /// Id of the target server
        server: String,
        /// The requested tool name
        tool: String,
        /// Comma-separated list of tools the server actually advertises
        available: String,
    },

    /// The session handshake has not completed; calls cannot be issued
    #[error("Server `{0}` is not initialized")]
    NotReady(String),

    /// Process supervision errors (spawn failure, signal delivery)
    #[error("Process error: {0}")]
    Process(String),

    /// No free port could be reserved
    #[error("Port allocation error: {0}")]
    PortAllocation(String),

    /// The circuit breaker for a target is open; the call was not attempted
    #[error("Circuit breaker open for `{0}`")]
    BreakerOpen(String),

    /// All retry attempts were exhausted
    #[error("Operation failed after {attempts} attempts: {last_error}")]
    RetryExhausted {
        /// How many times the operation was attempted
        attempts: u32,
        /// Message of the final attempt's error
        last_error: String,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for toolfleet operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation. Typed
/// [`FleetError`] variants are recoverable via `downcast_ref`.
pub type Result<T> = anyhow::Result<T>;
