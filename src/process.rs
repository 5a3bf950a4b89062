//! Process supervisor for `ipc` tool servers
//!
//! The [`ProcessSupervisor`] owns the table of live child processes, keyed
//! by server id. Children are spawned as **new process groups** so that
//! termination reaches any grandchildren the tool itself spawns. Exit
//! events are observed asynchronously and deregister the handle, so a
//! crashed server is never mistaken for a live one on the next `start`.
//!
//! Per the launch contract, children get piped stdio: stdout is the inbound
//! transport stream, stdin the outbound one, stderr is log-only. The
//! supervisor hands the pipes to the transport layer via
//! [`ProcessHandle::take_stdio`]; it never reads or writes them itself.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::error::{FleetError, Result};
use crate::registry::ManagedServer;

/// How often the exit watcher polls a child for termination.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// A live supervised child process.
///
/// Cheap to clone; all clones refer to the same child.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    /// Id of the server this process implements.
    pub server_id: String,
    /// OS process id (also the process-group id, since the child leads its
    /// own group).
    pub pid: u32,
    child: Arc<Mutex<Child>>,
}

impl ProcessHandle {
    /// Take ownership of the child's stdio pipes.
    ///
    /// Each pipe can be taken exactly once; a second call fails. The
    /// transport layer calls this immediately after `start`.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Process`] if any pipe was already taken.
    pub async fn take_stdio(&self) -> Result<(ChildStdin, ChildStdout, ChildStderr)> {
        let mut child = self.child.lock().await;
        let stdin = child.stdin.take().ok_or_else(|| {
            anyhow::anyhow!(FleetError::Process(format!(
                "stdin of `{}` already taken",
                self.server_id
            )))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            anyhow::anyhow!(FleetError::Process(format!(
                "stdout of `{}` already taken",
                self.server_id
            )))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            anyhow::anyhow!(FleetError::Process(format!(
                "stderr of `{}` already taken",
                self.server_id
            )))
        })?;
        Ok((stdin, stdout, stderr))
    }
}

/// Spawns, tracks, and terminates server child processes.
///
/// The live-handle table is owned by the supervisor instance and mutated
/// only through its methods; there is no ambient state.
#[derive(Debug, Default)]
pub struct ProcessSupervisor {
    table: Arc<Mutex<HashMap<String, ProcessHandle>>>,
}

impl ProcessSupervisor {
    /// Create a supervisor with an empty process table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the server's child process, or return the existing live handle.
    ///
    /// Idempotent per server id: if a live handle exists, it is returned
    /// instead of spawning a duplicate. Otherwise the launch command is
    /// spawned as a new process group with piped stdio and the caller's
    /// environment overlaid on the inherited one, and an exit watcher is
    /// started that deregisters the handle when the child dies on its own.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Process`] if the definition has no launch spec
    /// or the spawn fails; no handle is registered on failure.
    pub async fn start(&self, server: &ManagedServer) -> Result<ProcessHandle> {
        let mut table = self.table.lock().await;
        if let Some(existing) = table.get(server.id()) {
            tracing::debug!(server = %server.id(), pid = existing.pid, "start: reusing live handle");
            return Ok(existing.clone());
        }

        let launch = server.definition.launch.as_ref().ok_or_else(|| {
            anyhow::anyhow!(FleetError::Process(format!(
                "server `{}` has no launch command",
                server.id()
            )))
        })?;

        let mut cmd = Command::new(&launch.command);
        cmd.args(&launch.args)
            .envs(&launch.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Lead a fresh process group so stop() can signal the whole tree.
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|e| {
            anyhow::anyhow!(FleetError::Process(format!(
                "failed to spawn `{}` for server `{}`: {}",
                launch.command,
                server.id(),
                e
            )))
        })?;

        let pid = child.id().ok_or_else(|| {
            anyhow::anyhow!(FleetError::Process(format!(
                "child for `{}` exited before a pid could be observed",
                server.id()
            )))
        })?;

        let handle = ProcessHandle {
            server_id: server.id().to_string(),
            pid,
            child: Arc::new(Mutex::new(child)),
        };
        table.insert(server.id().to_string(), handle.clone());
        drop(table);

        tracing::info!(server = %server.id(), pid, "spawned tool server");
        self.watch_exit(handle.clone());
        Ok(handle)
    }

    /// Send SIGTERM to the server's process group and forget the handle.
    ///
    /// If group termination fails (e.g. the group is already reaped), falls
    /// back to terminating the single tracked process. The id is removed
    /// from the live-handle table unconditionally, before any signalling,
    /// so termination can never leak bookkeeping. Stopping an unknown id is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Process`] only when both the group signal and
    /// the single-process fallback fail.
    pub async fn stop(&self, id: &str) -> Result<()> {
        let handle = {
            let mut table = self.table.lock().await;
            table.remove(id)
        };
        let Some(handle) = handle else {
            return Ok(());
        };

        if signal_group_term(handle.pid) {
            tracing::info!(server = %id, pid = handle.pid, "terminated process group");
            return Ok(());
        }

        // Group signalling failed; fall back to the tracked process alone.
        tracing::debug!(server = %id, pid = handle.pid, "group termination failed, killing single process");
        let mut child = handle.child.lock().await;
        child.start_kill().map_err(|e| {
            anyhow::anyhow!(FleetError::Process(format!(
                "failed to terminate server `{}` (pid {}): {}",
                id, handle.pid, e
            )))
        })
    }

    /// Stop every tracked process; used at shutdown.
    ///
    /// Individual failures are logged and do not stop the sweep.
    pub async fn dispose_all(&self) {
        let ids: Vec<String> = {
            let table = self.table.lock().await;
            table.keys().cloned().collect()
        };
        for id in ids {
            if let Err(e) = self.stop(&id).await {
                tracing::warn!(server = %id, "dispose_all: {e}");
            }
        }
    }

    /// Whether a live handle exists for `id`.
    pub async fn is_running(&self, id: &str) -> bool {
        self.table.lock().await.contains_key(id)
    }

    /// Number of tracked processes.
    pub async fn running_count(&self) -> usize {
        self.table.lock().await.len()
    }

    /// Watch for the child's exit and deregister its handle.
    ///
    /// Polling keeps the child mutex available to `take_stdio` and the
    /// single-process kill fallback; a blocking `wait()` would hold it for
    /// the child's whole lifetime.
    fn watch_exit(&self, handle: ProcessHandle) {
        let table = Arc::clone(&self.table);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(EXIT_POLL_INTERVAL).await;
                let status = {
                    let mut child = handle.child.lock().await;
                    child.try_wait()
                };
                match status {
                    Ok(None) => continue,
                    Ok(Some(status)) => {
                        tracing::warn!(
                            server = %handle.server_id,
                            pid = handle.pid,
                            %status,
                            "tool server exited"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            server = %handle.server_id,
                            pid = handle.pid,
                            "exit watcher lost the child: {e}"
                        );
                    }
                }
                let mut table = table.lock().await;
                // Only remove our own generation; a stop()+start() pair may
                // have installed a fresh handle under the same id.
                if table
                    .get(&handle.server_id)
                    .is_some_and(|h| h.pid == handle.pid)
                {
                    table.remove(&handle.server_id);
                }
                break;
            }
        });
    }
}

/// SIGTERM an entire process group; returns whether delivery succeeded.
#[cfg(unix)]
fn signal_group_term(pid: u32) -> bool {
    // SAFETY: pid came from a child this supervisor spawned; killpg on a
    // stale group id fails with ESRCH, which we report as failure.
    unsafe { libc::killpg(pid as libc::pid_t, libc::SIGTERM) == 0 }
}

#[cfg(not(unix))]
fn signal_group_term(_pid: u32) -> bool {
    // No process groups to signal; the single-process fallback handles it.
    false
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
