//! HTTP transport for remote tool servers
//!
//! This module implements [`HttpTransport`], which sends every outbound
//! JSON-RPC message as an HTTP POST to a fixed endpoint. The server replies
//! with either:
//!
//! - `application/json` -- a direct JSON-RPC response body, delivered to
//!   the inbound stream, or
//! - `202 Accepted` -- an acknowledgement with no body (used for
//!   notifications).
//!
//! Transport security and authentication are delegated to the environment;
//! callers may inject static headers (e.g. a bearer token minted outside
//! this crate) but no auth flow lives here.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::sync::{mpsc, Mutex};

use crate::error::{FleetError, Result};
use crate::rpc::transport::Transport;

/// HTTP POST-per-message transport for `protocol: http` server definitions.
///
/// # Examples
///
/// ```no_run
/// use std::collections::HashMap;
/// use std::time::Duration;
/// use url::Url;
/// use toolfleet::rpc::transport::http::HttpTransport;
///
/// let transport = HttpTransport::new(
///     Url::parse("http://localhost:3000/rpc").unwrap(),
///     HashMap::new(),
///     Duration::from_secs(30),
/// );
/// ```
#[derive(Debug)]
pub struct HttpTransport {
    /// Underlying reqwest HTTP client.
    http_client: reqwest::Client,
    /// Endpoint URL (POST target).
    endpoint: url::Url,
    /// Static extra headers merged into every request (e.g. Authorization).
    headers: HashMap<String, String>,
    /// Sender for inbound JSON-RPC message strings.
    response_tx: mpsc::UnboundedSender<String>,
    /// Shared receiver exposed via `receive()`.
    response_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl HttpTransport {
    /// Construct a new [`HttpTransport`] targeting `endpoint`.
    ///
    /// The `headers` map is merged into every outbound request. The
    /// `timeout` applies to each individual HTTP request; request-level
    /// correlation deadlines are enforced separately by the RPC client.
    ///
    /// No network I/O is performed at construction time.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - The tool server URL (e.g. `http://host/rpc`).
    /// * `headers` - Extra headers added to every request.
    /// * `timeout` - Per-request HTTP timeout.
    pub fn new(endpoint: url::Url, headers: HashMap<String, String>, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            // Default reqwest client construction only fails if TLS
            // initialisation fails, a fatal startup condition on any
            // supported platform.
            .expect("failed to build reqwest client");

        let (response_tx, response_rx) = mpsc::unbounded_channel();

        Self {
            http_client,
            endpoint,
            headers,
            response_tx,
            response_rx: Arc::new(Mutex::new(response_rx)),
        }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    /// Send a JSON-RPC message via HTTP POST to the endpoint.
    ///
    /// Response handling:
    ///
    /// - `202 Accepted`: no-op (notification ACK).
    /// - other success: body read and pushed to `receive()` when non-empty.
    /// - non-success status: returned as a transport error.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Transport`] if the HTTP request fails or the
    /// server returns a non-success status.
    async fn send(&self, message: String) -> Result<()> {
        let mut req = self
            .http_client
            .post(self.endpoint.as_str())
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .body(message);

        for (k, v) in &self.headers {
            req = req.header(k.as_str(), v.as_str());
        }

        let response = req.send().await.map_err(|e| {
            anyhow::anyhow!(FleetError::Transport {
                server: self.endpoint.to_string(),
                reason: format!("HTTP POST failed: {}", e),
            })
        })?;

        let status = response.status();

        // 202 Accepted = notification acknowledgement, no body expected.
        if status == reqwest::StatusCode::ACCEPTED {
            return Ok(());
        }

        if !status.is_success() {
            return Err(anyhow::anyhow!(FleetError::Transport {
                server: self.endpoint.to_string(),
                reason: format!("HTTP POST returned status {}", status),
            }));
        }

        let body = response.text().await.map_err(|e| {
            anyhow::anyhow!(FleetError::Transport {
                server: self.endpoint.to_string(),
                reason: format!("failed to read response body: {}", e),
            })
        })?;
        if !body.is_empty() {
            let _ = self.response_tx.send(body);
        }

        Ok(())
    }

    /// Returns a stream of inbound JSON-RPC message strings, one per
    /// successful POST response body.
    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        let rx = Arc::clone(&self.response_rx);
        Box::pin(futures::stream::unfold(rx, |rx| async move {
            let mut guard = rx.lock().await;
            let item = guard.recv().await?;
            drop(guard);
            Some((item, rx))
        }))
    }

    /// HTTP servers have no stderr side channel; always empty.
    fn receive_err(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        Box::pin(futures::stream::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_transport(endpoint: &str) -> HttpTransport {
        HttpTransport::new(
            url::Url::parse(endpoint).unwrap(),
            HashMap::new(),
            Duration::from_secs(5),
        )
    }

    /// `receive()` returns a stream that is initially empty.
    #[tokio::test]
    async fn test_receive_initially_empty() {
        let t = make_transport("http://localhost:9999/rpc");
        let mut stream = t.receive();
        let result = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(result.is_err(), "expected timeout on empty receive stream");
    }

    /// A JSON response body is delivered on `receive()`.
    #[tokio::test]
    async fn test_json_response_body_delivered() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .and(body_string_contains("ping"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#),
            )
            .mount(&server)
            .await;

        let t = make_transport(&format!("{}/rpc", server.uri()));
        t.send(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#.to_string())
            .await
            .unwrap();

        let mut stream = t.receive();
        let msg = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out")
            .expect("stream ended");
        assert!(msg.contains(r#""id":1"#));
    }

    /// `202 Accepted` is an ACK: send succeeds, nothing is delivered.
    #[tokio::test]
    async fn test_accepted_status_is_silent_ack() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let t = make_transport(&format!("{}/rpc", server.uri()));
        t.send("{}".to_string()).await.unwrap();

        let mut stream = t.receive();
        let result = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(result.is_err(), "202 must not deliver an inbound message");
    }

    /// A non-success status surfaces as a transport error.
    #[tokio::test]
    async fn test_error_status_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let t = make_transport(&format!("{}/rpc", server.uri()));
        let result = t.send("{}".to_string()).await;
        assert!(result.is_err());
        let err = result.unwrap_err();
        let fleet = err.downcast_ref::<FleetError>().expect("typed error");
        assert!(matches!(fleet, FleetError::Transport { .. }));
    }

    /// Static headers are attached to every POST.
    #[tokio::test]
    async fn test_static_headers_attached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(wiremock::matchers::header("x-fleet-token", "sekrit"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let mut headers = HashMap::new();
        headers.insert("x-fleet-token".to_string(), "sekrit".to_string());
        let t = HttpTransport::new(
            url::Url::parse(&format!("{}/rpc", server.uri())).unwrap(),
            headers,
            Duration::from_secs(5),
        );
        t.send("{}".to_string()).await.unwrap();
    }

    /// `receive_err()` is always empty for the HTTP transport.
    #[tokio::test]
    async fn test_receive_err_always_empty() {
        let t = make_transport("http://localhost:9999/rpc");
        let mut err_stream = t.receive_err();
        let result = tokio::time::timeout(Duration::from_millis(50), err_stream.next()).await;
        match result {
            Ok(None) | Err(_) => {}
            Ok(Some(msg)) => panic!("expected no diagnostics, got: {msg:?}"),
        }
    }
}
