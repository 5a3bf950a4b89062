//! Per-server tool session
//!
//! A [`ToolSession`] owns the plumbing between one [`Transport`] and one
//! [`RpcClient`]: two pump tasks moving serialized messages in each
//! direction, the correlation read loop, and the handshake state.
//!
//! # Lifecycle
//!
//! [`ToolSession::connect`] wires the channels and starts the background
//! tasks; the session begins **not ready**. [`ToolSession::initialize`]
//! performs the handshake: an `initialize` request advertising client
//! identity, then a `tools/list` whose result populates the cached
//! [`ToolDescriptor`] set. Only after both succeed is the session marked
//! ready. A handshake failure is logged, not thrown, so one misbehaving
//! server cannot abort fleet construction; the session simply stays
//! not-ready and calls against it fail with a typed error.
//!
//! The descriptor cache lives for the session's lifetime. A restarted
//! server means a dead session; callers build a fresh one rather than
//! refreshing this one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::{FleetError, Result};
use crate::rpc::client::{start_read_loop, RpcClient};
use crate::rpc::transport::Transport;
use crate::rpc::types::{
    ClientCapabilities, ClientInfo, InitializeParams, InitializeResponse, ListToolsResponse,
    ToolDescriptor, METHOD_INITIALIZE, METHOD_PING, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
    PROTOCOL_VERSION,
};

/// Tunable deadlines for one session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Deadline for each correlated request (tool calls included).
    pub call_timeout: Duration,
    /// How long `call_tool` waits for the handshake to complete before
    /// failing with [`FleetError::NotReady`].
    pub ready_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(60),
            ready_timeout: Duration::from_secs(20),
        }
    }
}

/// One client session with one tool server.
pub struct ToolSession {
    /// Id of the server this session talks to.
    server_id: String,
    /// Correlation client; shares its pending map with the read loop.
    client: RpcClient,
    /// Tools discovered during the handshake; fixed for the session.
    tools: Arc<RwLock<Vec<ToolDescriptor>>>,
    /// Flips to `true` once the handshake has completed.
    ready_tx: watch::Sender<bool>,
    /// Cloned by waiters in `call_tool`.
    ready_rx: watch::Receiver<bool>,
    /// Stops the read loop and the inbound pump.
    cancellation: CancellationToken,
    /// Deadlines.
    settings: SessionSettings,
}

impl std::fmt::Debug for ToolSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSession")
            .field("server_id", &self.server_id)
            .field("ready", &*self.ready_rx.borrow())
            .finish_non_exhaustive()
    }
}

impl ToolSession {
    /// Wire a session over `transport` and start its background tasks.
    ///
    /// Three tasks are spawned: the correlation read loop, an outbound pump
    /// draining client messages into [`Transport::send`], and an inbound
    /// pump feeding [`Transport::receive`] into the read loop. All three
    /// stop when the session's cancellation token fires or the transport
    /// closes.
    ///
    /// The returned session is **not ready**; call
    /// [`ToolSession::initialize`] to perform the handshake.
    ///
    /// # Arguments
    ///
    /// * `server_id` - Id of the server, used for correlation errors and logs.
    /// * `transport` - The wired transport to the server.
    /// * `settings` - Session deadlines.
    pub fn connect(
        server_id: impl Into<String>,
        transport: Arc<dyn Transport>,
        settings: SessionSettings,
    ) -> Self {
        let server_id = server_id.into();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();
        let cancellation = CancellationToken::new();

        // The read loop and the session's own client share one pending map.
        let shared = Arc::new(RpcClient::new(server_id.clone(), out_tx));
        start_read_loop(in_rx, cancellation.clone(), Arc::clone(&shared));
        let client = shared.clone_shared();

        // Outbound pump: client -> transport.
        let transport_send = Arc::clone(&transport);
        let send_id = server_id.clone();
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if let Err(e) = transport_send.send(msg).await {
                    tracing::warn!(server = %send_id, "outbound pump stopping: {e}");
                    break;
                }
            }
        });

        // Inbound pump: transport -> read loop.
        let transport_recv = Arc::clone(&transport);
        let cancel = cancellation.clone();
        tokio::spawn(async move {
            use futures::StreamExt;
            let mut stream = transport_recv.receive();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    item = stream.next() => match item {
                        Some(msg) => {
                            if in_tx.send(msg).is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });

        let (ready_tx, ready_rx) = watch::channel(false);

        Self {
            server_id,
            client,
            tools: Arc::new(RwLock::new(Vec::new())),
            ready_tx,
            ready_rx,
            cancellation,
            settings,
        }
    }

    /// Perform the initialize-then-discover handshake.
    ///
    /// Sends `initialize` advertising the client identity and capability
    /// flags, then `tools/list`; the listed tools populate the session's
    /// descriptor cache and the session is marked ready.
    ///
    /// Failures are logged at warn and swallowed: the session stays
    /// not-ready and subsequent calls fail with [`FleetError::NotReady`]
    /// until a future handshake succeeds. This keeps a misbehaving server
    /// from aborting the whole fleet at construction time.
    ///
    /// # Arguments
    ///
    /// * `client_info` - Identity advertised in the `initialize` request.
    pub async fn initialize(&self, client_info: ClientInfo) {
        match self.try_initialize(client_info).await {
            Ok(count) => {
                tracing::info!(
                    server = %self.server_id,
                    tools = count,
                    "session ready"
                );
            }
            Err(e) => {
                tracing::warn!(
                    server = %self.server_id,
                    "handshake failed, session stays not-ready: {e}"
                );
            }
        }
    }

    /// The fallible handshake body; separated so failures funnel through a
    /// single logging site in [`ToolSession::initialize`].
    async fn try_initialize(&self, client_info: ClientInfo) -> Result<usize> {
        let response: InitializeResponse = self
            .client
            .request(
                METHOD_INITIALIZE,
                InitializeParams {
                    protocol_version: PROTOCOL_VERSION.to_string(),
                    capabilities: ClientCapabilities {
                        tools: Some(serde_json::json!({})),
                    },
                    client_info,
                },
                Some(self.settings.call_timeout),
            )
            .await?;

        tracing::debug!(
            server = %self.server_id,
            version = %response.protocol_version,
            "initialize acknowledged"
        );

        let listed: ListToolsResponse = self
            .client
            .request(
                METHOD_TOOLS_LIST,
                serde_json::json!({}),
                Some(self.settings.call_timeout),
            )
            .await?;

        let count = listed.tools.len();
        *self.tools.write().await = listed.tools;

        // Receivers may all be gone when nobody is waiting; that is fine.
        let _ = self.ready_tx.send(true);
        Ok(count)
    }

    /// Whether the handshake has completed.
    pub fn is_ready(&self) -> bool {
        *self.ready_rx.borrow()
    }

    /// The tools discovered during the handshake.
    pub async fn tools(&self) -> Vec<ToolDescriptor> {
        self.tools.read().await.clone()
    }

    /// Invoke a named tool and return its raw result value.
    ///
    /// If the handshake has not completed yet, waits up to
    /// `settings.ready_timeout` for readiness before failing. The tool name
    /// is validated against the cached descriptor set before anything is
    /// sent; an unknown name fails fast with an error listing the tools the
    /// server actually advertises.
    ///
    /// # Arguments
    ///
    /// * `name` - The tool name as returned by `tools/list`.
    /// * `arguments` - Optional JSON arguments matching the tool's schema.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::NotReady`] if the session never became ready,
    /// [`FleetError::UnknownTool`] for a name outside the descriptor set,
    /// and the [`RpcClient::request`] errors otherwise.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        self.wait_ready().await?;

        {
            let tools = self.tools.read().await;
            if !tools.iter().any(|t| t.name == name) {
                let available = tools
                    .iter()
                    .map(|t| t.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(anyhow::anyhow!(FleetError::UnknownTool {
                    server: self.server_id.clone(),
                    tool: name.to_string(),
                    available,
                }));
            }
        }

        self.client
            .request(
                METHOD_TOOLS_CALL,
                crate::rpc::types::CallToolParams {
                    name: name.to_string(),
                    arguments,
                },
                Some(self.settings.call_timeout),
            )
            .await
    }

    /// Send a `ping` and verify the server responds.
    ///
    /// # Errors
    ///
    /// Returns the underlying request error on timeout or transport failure.
    pub async fn ping(&self) -> Result<()> {
        let _: serde_json::Value = self
            .client
            .request(
                METHOD_PING,
                serde_json::json!({}),
                Some(self.settings.call_timeout),
            )
            .await?;
        Ok(())
    }

    /// Stop the read loop and the inbound pump.
    ///
    /// Pending requests are rejected promptly rather than left to time out.
    /// The underlying process (if any) is the supervisor's to terminate.
    pub fn close(&self) {
        self.cancellation.cancel();
    }

    /// Bounded wait for the handshake to complete.
    async fn wait_ready(&self) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }

        let mut rx = self.ready_rx.clone();
        let waited = tokio::time::timeout(self.settings.ready_timeout, async {
            loop {
                if *rx.borrow_and_update() {
                    return;
                }
                if rx.changed().await.is_err() {
                    // Sender dropped: the session is being torn down.
                    return;
                }
            }
        })
        .await;

        if waited.is_err() || !self.is_ready() {
            return Err(anyhow::anyhow!(FleetError::NotReady(self.server_id.clone())));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
