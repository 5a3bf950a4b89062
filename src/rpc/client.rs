//! Transport-agnostic async JSON-RPC 2.0 correlation client
//!
//! This module provides [`RpcClient`], a channel-backed JSON-RPC 2.0 client
//! that is completely decoupled from the underlying transport. Callers wire
//! up two [`tokio::sync::mpsc`] channels (one for outbound serialized
//! messages, one for inbound serialized messages) and then call
//! [`start_read_loop`] to process responses concurrently.
//!
//! # Design
//!
//! - Outbound messages are written to `outbound_tx` as newline-free JSON
//!   strings. The transport layer is responsible for framing (newline
//!   appended for stdio, HTTP POST body for http).
//! - Inbound messages arrive on `inbound_rx` as JSON strings. A line that
//!   fails to parse is logged and dropped; it never takes down the client.
//! - In-flight requests are tracked in a `pending` map keyed by `u64`
//!   request id. Each entry is a `oneshot::Sender` that receives the
//!   `result` or `error` value when the matching response arrives. Inbound
//!   messages with an unknown or missing id are ignored, which also covers
//!   responses arriving after their request already timed out.
//! - A [`tokio_util::sync::CancellationToken`] stops the read loop cleanly
//!   and drops all pending senders so that awaiting callers receive an
//!   error instead of hanging.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{FleetError, Result};
use crate::rpc::types::{JsonRpcError, JsonRpcRequest};

/// Default deadline applied to every request when the caller does not
/// specify one. Tool calls can legitimately run for a while.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// The pending-response map type: maps request id to the oneshot sender.
type PendingMap =
    HashMap<u64, oneshot::Sender<std::result::Result<serde_json::Value, JsonRpcError>>>;

/// Transport-agnostic async JSON-RPC 2.0 client.
///
/// Create one with [`RpcClient::new`], passing the server id (used in
/// error messages) and the outbound channel sender. Then call
/// [`start_read_loop`] to process incoming messages, and issue requests
/// with [`RpcClient::request`].
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use tokio::sync::mpsc;
/// use tokio_util::sync::CancellationToken;
/// use toolfleet::rpc::client::{start_read_loop, RpcClient};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let (out_tx, _out_rx) = mpsc::unbounded_channel::<String>();
///     let (_in_tx, in_rx) = mpsc::unbounded_channel::<String>();
///     let token = CancellationToken::new();
///     let client = Arc::new(RpcClient::new("docs", out_tx));
///     let _handle = start_read_loop(in_rx, token, Arc::clone(&client));
///     Ok(())
/// }
/// ```
pub struct RpcClient {
    /// Server id this client talks to; used in error messages only.
    server_id: String,
    /// Monotonically increasing request id counter.
    next_id: Arc<AtomicU64>,
    /// In-flight requests waiting for a response.
    pending: Arc<Mutex<PendingMap>>,
    /// Channel used to send serialized JSON-RPC messages to the transport.
    outbound_tx: mpsc::UnboundedSender<String>,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("server_id", &self.server_id)
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl RpcClient {
    /// Create a new `RpcClient`.
    ///
    /// The caller is responsible for:
    /// 1. Wiring `outbound_rx` to a transport writer.
    /// 2. Calling [`start_read_loop`] with the corresponding inbound receiver.
    ///
    /// # Arguments
    ///
    /// * `server_id` - Id of the server this client talks to.
    /// * `outbound_tx` - Sender half of the outbound message channel.
    pub fn new(server_id: impl Into<String>, outbound_tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            server_id: server_id.into(),
            next_id: Arc::new(AtomicU64::new(1)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            outbound_tx,
        }
    }

    /// Create an [`RpcClient`] that shares all internal state with `self`.
    ///
    /// The returned client shares the same `pending` map and `next_id`
    /// counter as the original. This is the canonical pattern for wiring a
    /// value-owning caller with [`start_read_loop`] (which takes
    /// `Arc<RpcClient>`): both ends operate on the same pending map, so
    /// responses resolved by the read loop are visible to requests issued
    /// through the clone.
    pub fn clone_shared(&self) -> Self {
        Self {
            server_id: self.server_id.clone(),
            next_id: Arc::clone(&self.next_id),
            pending: Arc::clone(&self.pending),
            outbound_tx: self.outbound_tx.clone(),
        }
    }

    /// Send a JSON-RPC request and await the typed response.
    ///
    /// Assigns the next monotonic id, serializes the request, sends it on
    /// the outbound channel, and waits for the matching response with an
    /// optional deadline. On expiry the pending entry is removed, so a
    /// late-arriving response for this id is ignored by the read loop.
    ///
    /// # Arguments
    ///
    /// * `method` - The JSON-RPC method name.
    /// * `params` - Parameters to serialize into the `params` field.
    /// * `timeout` - Optional deadline; defaults to [`DEFAULT_REQUEST_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Transport`] if the outbound channel is closed
    /// or the read loop exited before a response arrived.
    /// Returns [`FleetError::Timeout`] if no response arrives in time.
    /// Returns [`FleetError::Rpc`] if the server returns an error response.
    /// Returns [`FleetError::Serialization`] if (de)serialization fails.
    pub async fn request<P, R>(
        &self,
        method: &str,
        params: P,
        timeout: Option<Duration>,
    ) -> Result<R>
    where
        P: serde::Serialize + Send,
        R: serde::de::DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        // Register the pending slot before sending so the response can never
        // arrive before we are ready to receive it.
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id, tx);
        }

        let message = serde_json::to_string(&JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(serde_json::json!(id)),
            method: method.to_string(),
            params: Some(serde_json::to_value(params)?),
        })?;

        if self.outbound_tx.send(message).is_err() {
            let mut pending = self.pending.lock().await;
            pending.remove(&id);
            return Err(anyhow::anyhow!(FleetError::Transport {
                server: self.server_id.clone(),
                reason: "outbound channel closed".to_string(),
            }));
        }

        let deadline = timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let outcome = match tokio::time::timeout(deadline, rx).await {
            Ok(o) => o,
            Err(_) => {
                // Deadline expired: remove the entry so a late response for
                // this id is ignored rather than resolved into nothing.
                let mut pending = self.pending.lock().await;
                pending.remove(&id);
                return Err(anyhow::anyhow!(FleetError::Timeout {
                    server: self.server_id.clone(),
                    method: method.to_string(),
                }));
            }
        };

        // The oneshot was dropped (read loop exited) before a response arrived.
        let rpc_result = outcome.map_err(|_| {
            anyhow::anyhow!(FleetError::Transport {
                server: self.server_id.clone(),
                reason: "read loop exited before response arrived".to_string(),
            })
        })?;

        // Promote a JSON-RPC error into a FleetError.
        let value = rpc_result.map_err(|e| {
            anyhow::anyhow!(FleetError::Rpc {
                server: self.server_id.clone(),
                code: e.code,
                message: e.message,
            })
        })?;

        serde_json::from_value(value).map_err(|e| anyhow::anyhow!(FleetError::Serialization(e)))
    }

    /// How many requests are currently awaiting a response.
    ///
    /// Exposed for diagnostics and tests.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

/// Start the JSON-RPC read loop as a background Tokio task.
///
/// The loop reads serialized JSON strings from `inbound_rx` and resolves
/// matching pending entries:
///
/// - A message with an `id` and a `result` or `error` field resolves the
///   matching pending [`oneshot`] sender; the entry is removed.
/// - A message with an unknown or missing id is ignored (this covers both
///   server-side noise and responses that arrive after a timeout).
/// - A line that fails to parse as JSON is logged at warn and dropped.
///
/// On cancellation, all pending senders are dropped so that any in-flight
/// `request()` call receives a channel-closed error rather than blocking
/// until its deadline.
///
/// # Arguments
///
/// * `inbound_rx` - Receiver for inbound JSON-RPC message strings.
/// * `cancellation` - Token used to stop the loop gracefully.
/// * `client` - Shared reference to the client whose pending map to service.
///
/// # Returns
///
/// A [`tokio::task::JoinHandle`] for the background task.
pub fn start_read_loop(
    mut inbound_rx: mpsc::UnboundedReceiver<String>,
    cancellation: CancellationToken,
    client: Arc<RpcClient>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = cancellation.cancelled() => {
                    // Drop all pending senders so that callers receive a
                    // channel-closed error instead of waiting forever.
                    let mut pending = client.pending.lock().await;
                    pending.clear();
                    break;
                }

                maybe_msg = inbound_rx.recv() => {
                    let raw = match maybe_msg {
                        Some(s) => s,
                        None => {
                            // Inbound channel closed; treat as cancellation.
                            let mut pending = client.pending.lock().await;
                            pending.clear();
                            break;
                        }
                    };

                    dispatch_message(&raw, &client).await;
                }
            }
        }
    })
}

/// Classify and dispatch a single inbound JSON string.
///
/// Extracted from the loop body so the correlation logic can be unit
/// tested without a live transport.
async fn dispatch_message(raw: &str, client: &Arc<RpcClient>) {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(server = %client.server_id, "dropping malformed inbound frame: {e}");
            return;
        }
    };

    let has_result = value.get("result").is_some();
    let has_error = value.get("error").is_some();
    if !has_result && !has_error {
        tracing::debug!(server = %client.server_id, "ignoring non-response message");
        return;
    }

    let Some(id) = parse_id(&value["id"]) else {
        tracing::debug!(server = %client.server_id, "ignoring response with missing or non-integer id");
        return;
    };

    let tx = {
        let mut pending = client.pending.lock().await;
        pending.remove(&id)
    };

    let Some(tx) = tx else {
        // Either the id was never ours or the request already timed out.
        tracing::debug!(server = %client.server_id, id, "ignoring response for unknown id");
        return;
    };

    let outcome: std::result::Result<serde_json::Value, JsonRpcError> =
        if let Some(error_val) = value.get("error") {
            match serde_json::from_value::<JsonRpcError>(error_val.clone()) {
                Ok(e) => Err(e),
                Err(_) => Err(JsonRpcError {
                    code: -32603,
                    message: format!("malformed error object: {error_val}"),
                    data: None,
                }),
            }
        } else {
            Ok(value
                .get("result")
                .cloned()
                .unwrap_or(serde_json::Value::Null))
        };

    // Ignore send errors: the caller may have already timed out.
    let _ = tx.send(outcome);
}

/// Extract a numeric request id, tolerating string-encoded integers.
fn parse_id(id_val: &serde_json::Value) -> Option<u64> {
    if let Some(n) = id_val.as_u64() {
        return Some(n);
    }
    id_val.as_str().and_then(|s| s.parse::<u64>().ok())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
