//! Stdio transport for supervised child-process servers
//!
//! This module implements [`StdioTransport`], which frames JSON-RPC
//! messages over the stdio pipes of a child process spawned by the
//! process supervisor.
//!
//! # Protocol
//!
//! - Outbound messages are written to the child's stdin as a single JSON
//!   object followed by a newline (`\n`).
//! - Inbound data is buffered and split on newlines; each non-empty line is
//!   delivered as one message (newline stripped). Framing is the transport's
//!   concern; whether a line parses as JSON is decided downstream, where a
//!   bad line is dropped without affecting its neighbours.
//! - The child's stderr is forwarded to a diagnostic stream and logged via
//!   `tracing::debug!`. Stderr output is never treated as an error
//!   condition and never enters request correlation.
//!
//! # Lifecycle
//!
//! The transport is created via [`StdioTransport::wire`] from pipes taken
//! off a [`crate::process::ProcessHandle`]. Spawning and terminating the
//! child belongs to the [`crate::process::ProcessSupervisor`]; this type
//! only moves bytes.

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::{mpsc, Mutex};

use crate::error::{FleetError, Result};
use crate::rpc::transport::Transport;

/// Stdio-based transport over the pipes of a supervised child process.
///
/// Communication happens over the child's stdin (outbound) and stdout
/// (inbound) using newline-delimited JSON. The child's stderr is captured
/// and forwarded through [`Transport::receive_err`] as diagnostic-only
/// output.
#[derive(Debug)]
pub struct StdioTransport {
    /// Id of the server behind the pipes; used in errors and logs.
    server_id: String,
    /// Sender side of the stdin channel; `send()` writes here.
    stdin_tx: mpsc::UnboundedSender<String>,
    /// Shared receiver for stdout lines (one JSON message per line).
    stdout_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    /// Shared receiver for stderr lines (diagnostics only).
    stderr_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl StdioTransport {
    /// Wire up a transport from a child process's stdio pipes.
    ///
    /// Three background Tokio tasks are started immediately:
    /// 1. A writer that drains the internal stdin channel into the child's
    ///    stdin, appending a newline per message.
    /// 2. A stdout reader that sends each non-empty line to the inbound
    ///    channel.
    /// 3. A stderr reader that sends each line to the diagnostic channel
    ///    and logs it at `DEBUG` level.
    ///
    /// All three tasks exit on their own when the child's pipes close.
    ///
    /// # Arguments
    ///
    /// * `server_id` - Id of the server, used in log output.
    /// * `stdin` - The child's stdin pipe (outbound stream).
    /// * `stdout` - The child's stdout pipe (inbound stream).
    /// * `stderr` - The child's stderr pipe (log-only side channel).
    pub fn wire(
        server_id: &str,
        stdin: ChildStdin,
        stdout: ChildStdout,
        stderr: ChildStderr,
    ) -> Self {
        let (stdin_tx, mut stdin_rx) = mpsc::unbounded_channel::<String>();
        let (stdout_tx, stdout_rx) = mpsc::unbounded_channel::<String>();
        let (stderr_tx, stderr_rx) = mpsc::unbounded_channel::<String>();

        // Background task: forward stdin_rx -> child stdin.
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(msg) = stdin_rx.recv().await {
                let line = format!("{}\n", msg);
                if stdin.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        // Background task: drain child stdout -> stdout_tx, one line per
        // message, skipping blank lines.
        tokio::spawn(async move {
            let reader = BufReader::new(stdout);
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                if stdout_tx.send(line).is_err() {
                    break;
                }
            }
        });

        // Background task: drain child stderr -> stderr_tx + tracing log.
        let log_id = server_id.to_string();
        tokio::spawn(async move {
            let reader = BufReader::new(stderr);
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(server = %log_id, "server stderr: {}", line);
                if stderr_tx.send(line).is_err() {
                    break;
                }
            }
        });

        Self {
            server_id: server_id.to_string(),
            stdin_tx,
            stdout_rx: Arc::new(Mutex::new(stdout_rx)),
            stderr_rx: Arc::new(Mutex::new(stderr_rx)),
        }
    }
}

#[async_trait::async_trait]
impl Transport for StdioTransport {
    /// Send a JSON-RPC message to the child process via its stdin.
    ///
    /// The message is enqueued on an internal channel; a background task
    /// writes it to the child's stdin followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Transport`] if the internal channel is closed
    /// (i.e. the background writer task has exited, usually because the
    /// child died).
    async fn send(&self, message: String) -> Result<()> {
        self.stdin_tx.send(message).map_err(|_| {
            anyhow::anyhow!(FleetError::Transport {
                server: self.server_id.clone(),
                reason: "stdin channel closed".to_string(),
            })
        })
    }

    /// Returns a stream of JSON-RPC messages received from the child's
    /// stdout (one complete line per item, newline stripped).
    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        let rx = Arc::clone(&self.stdout_rx);
        Box::pin(futures::stream::unfold(rx, |rx| async move {
            let mut guard = rx.lock().await;
            let item = guard.recv().await?;
            drop(guard);
            Some((item, rx))
        }))
    }

    /// Returns a stream of diagnostic lines from the child's stderr.
    fn receive_err(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        let rx = Arc::clone(&self.stderr_rx);
        Box::pin(futures::stream::unfold(rx, |rx| async move {
            let mut guard = rx.lock().await;
            let item = guard.recv().await?;
            drop(guard);
            Some((item, rx))
        }))
    }
}
