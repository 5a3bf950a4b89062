//! In-process fake transport for unit and integration tests
//!
//! This module provides [`FakeTransport`] and [`FakeTransportHandle`], an
//! in-process pair that replaces real process or network I/O in tests.
//!
//! # Channel Wiring
//!
//! From the **client** perspective:
//!
//! - "outbound" = what the client *sends* = what the test reads via
//!   `handle.outbound_rx`.
//! - "inbound"  = what the client *receives* = what the test injects via
//!   `handle.inbound_tx`.
//!
//! ```text
//! client send() -----> outbound_tx -----> outbound_rx (handle reads)
//! handle inbound_tx -> inbound_tx  -----> inbound_rx  (client receive())
//! ```

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use tokio::sync::{mpsc, Mutex};

use crate::error::{FleetError, Result};
use crate::rpc::transport::Transport;

/// In-process fake transport for use in tests.
///
/// Implements the full [`Transport`] trait using in-memory channels, so
/// tests can drive a session without spawning real processes or making
/// network requests.
#[derive(Debug)]
pub struct FakeTransport {
    /// Sender side for `send()`; the handle drains it via `outbound_rx`.
    outbound_tx: mpsc::UnboundedSender<String>,
    /// Shared receiver for the inbound channel; exposed via `receive()`.
    inbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    /// Sender used by `inject_response()` to push messages onto the
    /// inbound channel (same channel end as `handle.inbound_tx`).
    inbound_inject_tx: mpsc::UnboundedSender<String>,
}

impl FakeTransport {
    /// Create a new `(FakeTransport, FakeTransportHandle)` pair.
    ///
    /// Wire the [`FakeTransport`] into the code under test. Use the
    /// returned [`FakeTransportHandle`] from your test to observe outbound
    /// traffic and inject inbound responses.
    pub fn new() -> (Self, FakeTransportHandle) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();

        let transport = Self {
            outbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            inbound_inject_tx: inbound_tx.clone(),
        };

        let handle = FakeTransportHandle {
            outbound_rx,
            inbound_tx,
        };

        (transport, handle)
    }

    /// Inject a [`serde_json::Value`] as a server response.
    ///
    /// The value is serialized and pushed onto the inbound channel, so the
    /// next poll of [`Transport::receive`] will yield it.
    ///
    /// # Panics
    ///
    /// Panics if the inbound channel has been closed.
    pub fn inject_response(&self, response: serde_json::Value) {
        let serialized =
            serde_json::to_string(&response).expect("FakeTransport: failed to serialize response");
        self.inbound_inject_tx
            .send(serialized)
            .expect("FakeTransport: inbound channel closed before inject_response");
    }
}

/// The test-side handle for a [`FakeTransport`].
///
/// Use this to:
///
/// - Read messages the client under test sent: `outbound_rx.recv().await`
/// - Inject server responses the client will receive: `inbound_tx.send(...)`
#[derive(Debug)]
pub struct FakeTransportHandle {
    /// Receives messages that the client sent via [`Transport::send`].
    pub outbound_rx: mpsc::UnboundedReceiver<String>,
    /// Sends server responses into the client's [`Transport::receive`] stream.
    pub inbound_tx: mpsc::UnboundedSender<String>,
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    /// Record the outbound message so the test can read it via
    /// [`FakeTransportHandle::outbound_rx`].
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Transport`] if the outbound channel is closed
    /// (i.e. the [`FakeTransportHandle`] was dropped).
    async fn send(&self, message: String) -> Result<()> {
        self.outbound_tx.send(message).map_err(|_| {
            anyhow::anyhow!(FleetError::Transport {
                server: "fake".to_string(),
                reason: "outbound channel closed".to_string(),
            })
        })
    }

    /// Returns a stream of messages injected via
    /// [`FakeTransportHandle::inbound_tx`] or [`FakeTransport::inject_response`].
    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        let rx = Arc::clone(&self.inbound_rx);
        Box::pin(futures::stream::unfold(rx, |rx| async move {
            let mut guard = rx.lock().await;
            let item = guard.recv().await?;
            drop(guard);
            Some((item, rx))
        }))
    }

    /// Always returns an empty stream (the fake transport has no stderr).
    fn receive_err(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        Box::pin(futures::stream::empty())
    }
}

/// Spawn a scripted responder that answers every outbound request.
///
/// For each request read from `handle.outbound_rx`, the `respond` closure
/// is called with the parsed request value; when it returns `Some(v)`, `v`
/// is serialized and injected as the inbound response. Returning `None`
/// swallows the request (useful for simulating an unresponsive server).
///
/// Used by orchestrator and session tests to stand in for a well-behaved
/// or misbehaving tool server.
pub fn spawn_scripted_responder(
    mut handle: FakeTransportHandle,
    respond: impl Fn(serde_json::Value) -> Option<serde_json::Value> + Send + 'static,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(raw) = handle.outbound_rx.recv().await {
            let Ok(req) = serde_json::from_str::<serde_json::Value>(&raw) else {
                continue;
            };
            if let Some(resp) = respond(req) {
                if handle
                    .inbound_tx
                    .send(serde_json::to_string(&resp).expect("serialize scripted response"))
                    .is_err()
                {
                    break;
                }
            }
        }
    })
}

/// A scripted responder implementing the happy-path handshake plus a
/// single `echo` tool, mirroring the `fleet_test_server` helper binary.
///
/// `fail_tool_calls` makes every `tools/call` return a JSON-RPC error,
/// which is how tests simulate a consistently failing server.
pub fn echo_responder(fail_tool_calls: bool) -> impl Fn(serde_json::Value) -> Option<serde_json::Value> {
    move |req: serde_json::Value| {
        let id = req.get("id").cloned().unwrap_or(serde_json::Value::Null);
        let method = req.get("method").and_then(|m| m.as_str()).unwrap_or("");
        match method {
            "initialize" => Some(serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": "2025-03-26",
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "fake", "version": "0.0.0" }
                }
            })),
            "tools/list" => Some(serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "tools": [
                        { "name": "echo", "description": "Echoes input", "inputSchema": { "type": "object" } }
                    ]
                }
            })),
            "tools/call" if fail_tool_calls => Some(serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32000, "message": "tool backend unavailable" }
            })),
            "tools/call" => {
                let args = req["params"]["arguments"].clone();
                Some(serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": { "echo": args }
                }))
            }
            "ping" => Some(serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {}
            })),
            _ => Some(serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": format!("Method not found: {method}") }
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures::StreamExt;

    /// `send()` delivers the message to `handle.outbound_rx`.
    #[tokio::test]
    async fn test_send_delivers_to_handle_outbound_rx() {
        let (transport, mut handle) = FakeTransport::new();

        transport
            .send(r#"{"jsonrpc":"2.0","method":"ping"}"#.to_string())
            .await
            .unwrap();

        let received = tokio::time::timeout(Duration::from_secs(2), handle.outbound_rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");

        assert_eq!(received, r#"{"jsonrpc":"2.0","method":"ping"}"#);
    }

    /// `receive()` yields messages injected via `handle.inbound_tx`.
    #[tokio::test]
    async fn test_receive_yields_injected_message() {
        let (transport, handle) = FakeTransport::new();

        handle
            .inbound_tx
            .send(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#.to_string())
            .unwrap();

        let mut stream = transport.receive();
        let msg = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out")
            .expect("stream ended");

        assert_eq!(msg, r#"{"jsonrpc":"2.0","id":1,"result":{}}"#);
    }

    /// `inject_response` serializes and delivers a `serde_json::Value`.
    #[tokio::test]
    async fn test_inject_response_serializes_value() {
        let (transport, _handle) = FakeTransport::new();

        transport.inject_response(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 42,
            "result": { "status": "ok" }
        }));

        let mut stream = transport.receive();
        let msg = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out")
            .expect("stream ended");

        let parsed: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["id"], 42);
        assert_eq!(parsed["result"]["status"], "ok");
    }

    /// `send()` returns an error when the handle is dropped.
    #[tokio::test]
    async fn test_send_returns_error_when_handle_dropped() {
        let (transport, handle) = FakeTransport::new();
        drop(handle);

        let result = transport.send("test".to_string()).await;
        assert!(result.is_err());
    }

    /// The echo responder answers the full handshake sequence.
    #[tokio::test]
    async fn test_echo_responder_answers_handshake() {
        let (transport, handle) = FakeTransport::new();
        spawn_scripted_responder(handle, echo_responder(false));

        transport
            .send(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#.to_string())
            .await
            .unwrap();

        let mut stream = transport.receive();
        let msg = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out")
            .expect("stream ended");
        let v: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(v["result"]["protocolVersion"], "2025-03-26");
    }

    /// `FakeTransport` satisfies the `Transport` trait object bound.
    #[test]
    fn test_fake_transport_is_object_safe() {
        let (transport, _handle) = FakeTransport::new();
        let _boxed: Box<dyn Transport> = Box::new(transport);
    }
}
