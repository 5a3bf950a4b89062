//! Capability fan-out across the server fleet
//!
//! The [`Orchestrator`] owns the [`ServerRegistry`], the
//! [`ProcessSupervisor`], one [`ToolSession`] per connected server, and one
//! circuit-breaker + retry pairing per server id. A query fans out to every
//! enabled server advertising the capability, awaits all of them, and
//! aggregates partial success: one bad server can neither block nor corrupt
//! the results of the others.
//!
//! Failure of a single candidate is data (an entry in
//! [`QueryOutcome::failed`]), not an error; `query` itself never fails.
//! Successful responses are additionally forwarded to the injected
//! [`KnowledgeSink`], and a sink failure is logged without touching the
//! outcome.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{FleetError, Result};
use crate::knowledge::{KnowledgeNode, KnowledgeSink};
use crate::process::ProcessSupervisor;
use crate::registry::{ServerRegistry, TransportKind};
use crate::resilience::{BreakerSettings, CircuitBreaker, RetryWithBackoff};
use crate::rpc::session::{SessionSettings, ToolSession};
use crate::rpc::transport::http::HttpTransport;
use crate::rpc::transport::stdio::StdioTransport;
use crate::rpc::types::ClientInfo;

/// Tunables shared by every server the orchestrator manages.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Per-session deadlines.
    pub session: SessionSettings,
    /// Breaker thresholds applied per server.
    pub breaker: BreakerSettings,
    /// Retry policy applied per server.
    pub retry: RetryWithBackoff,
    /// Per-request timeout for HTTP transports.
    pub http_timeout: Duration,
    /// Identity advertised during handshakes.
    pub client_info: ClientInfo,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            session: SessionSettings::default(),
            breaker: BreakerSettings::default(),
            retry: RetryWithBackoff::default(),
            http_timeout: Duration::from_secs(30),
            client_info: ClientInfo {
                name: "toolfleet".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }
}

/// Provenance for one fan-out query; threaded to the knowledge sink.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique id of this query.
    pub query_id: Uuid,
    /// The capability queried.
    pub capability: String,
    /// The arguments fanned out.
    pub args: serde_json::Value,
    /// When the query was issued.
    pub issued_at: DateTime<Utc>,
}

impl RequestContext {
    /// Build a context stamped with a fresh id and the current time.
    pub fn new(capability: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            query_id: Uuid::new_v4(),
            capability: capability.into(),
            args,
            issued_at: Utc::now(),
        }
    }
}

/// One server's successful contribution to a query.
#[derive(Debug, Clone)]
pub struct ServerSuccess {
    /// Id of the responding server.
    pub server_id: String,
    /// The raw tool result.
    pub result: serde_json::Value,
}

/// One server's failure within a query.
#[derive(Debug, Clone)]
pub struct ServerFailure {
    /// Id of the failing server.
    pub server_id: String,
    /// Rendered error message.
    pub error: String,
}

/// Aggregated result of one fan-out query.
///
/// Produced once per query and never mutated after return. An empty
/// `successful` list with a non-empty `failed` list is a valid outcome;
/// callers decide what "no usable result" means.
#[derive(Debug, Clone, Default)]
pub struct QueryOutcome {
    /// Per-server successes, in completion order.
    pub successful: Vec<ServerSuccess>,
    /// Per-server failures, in completion order.
    pub failed: Vec<ServerFailure>,
}

impl QueryOutcome {
    /// No server produced a result (and at least one was asked).
    pub fn is_total_failure(&self) -> bool {
        self.successful.is_empty() && !self.failed.is_empty()
    }

    /// Some servers succeeded while others failed.
    pub fn is_degraded(&self) -> bool {
        !self.successful.is_empty() && !self.failed.is_empty()
    }
}

/// Breaker + retry pairing guarding one server.
struct ServerGuard {
    breaker: CircuitBreaker,
    retry: RetryWithBackoff,
}

/// Registry-driven fan-out coordinator.
pub struct Orchestrator {
    registry: ServerRegistry,
    supervisor: ProcessSupervisor,
    sessions: Mutex<HashMap<String, Arc<ToolSession>>>,
    guards: Mutex<HashMap<String, Arc<ServerGuard>>>,
    knowledge: Arc<dyn KnowledgeSink>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    /// Create an orchestrator over `registry`, forwarding successes to
    /// `knowledge`.
    pub fn new(
        registry: ServerRegistry,
        knowledge: Arc<dyn KnowledgeSink>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            registry,
            supervisor: ProcessSupervisor::new(),
            sessions: Mutex::new(HashMap::new()),
            guards: Mutex::new(HashMap::new()),
            knowledge,
            settings,
        }
    }

    /// The registry this orchestrator routes by.
    pub fn registry(&self) -> &ServerRegistry {
        &self.registry
    }

    /// Mutable access for explicit register/deregister/enable/disable.
    ///
    /// In-flight queries never mutate the registry.
    pub fn registry_mut(&mut self) -> &mut ServerRegistry {
        &mut self.registry
    }

    /// The supervisor tracking this orchestrator's child processes.
    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    /// Connect one server: start its process (ipc) or build its HTTP
    /// transport, wire a session, and run the handshake.
    ///
    /// Idempotent per id: an existing session is kept. A failed handshake
    /// leaves a not-ready session in place (its calls fail typed), per the
    /// session contract.
    ///
    /// # Errors
    ///
    /// Returns an error when the id is unknown, the process cannot be
    /// spawned, or an `http` definition lacks an endpoint. Handshake
    /// failures are not errors.
    pub async fn connect(&self, id: &str) -> Result<()> {
        {
            let sessions = self.sessions.lock().await;
            if sessions.contains_key(id) {
                return Ok(());
            }
        }

        let server = self.registry.get(id).ok_or_else(|| {
            anyhow::anyhow!(FleetError::Config(format!("unknown server id `{id}`")))
        })?;

        let transport: Arc<dyn crate::rpc::transport::Transport> =
            match server.definition.transport {
                TransportKind::Ipc => {
                    let handle = self.supervisor.start(server).await?;
                    let (stdin, stdout, stderr) = handle.take_stdio().await?;
                    Arc::new(StdioTransport::wire(id, stdin, stdout, stderr))
                }
                TransportKind::Http => {
                    let endpoint = server.definition.endpoint.clone().ok_or_else(|| {
                        anyhow::anyhow!(FleetError::Config(format!(
                            "http server `{id}` has no endpoint"
                        )))
                    })?;
                    Arc::new(HttpTransport::new(
                        endpoint,
                        HashMap::new(),
                        self.settings.http_timeout,
                    ))
                }
            };

        let session = Arc::new(ToolSession::connect(
            id,
            transport,
            self.settings.session.clone(),
        ));
        session.initialize(self.settings.client_info.clone()).await;

        let mut sessions = self.sessions.lock().await;
        sessions.insert(id.to_string(), session);
        Ok(())
    }

    /// Connect every enabled server; failures are logged and skipped.
    pub async fn connect_all(&self) {
        let ids: Vec<String> = self
            .registry
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.id().to_string())
            .collect();
        for id in ids {
            if let Err(e) = self.connect(&id).await {
                tracing::warn!(server = %id, "connect failed: {e}");
            }
        }
    }

    /// The session for `id`, if connected.
    pub async fn session(&self, id: &str) -> Option<Arc<ToolSession>> {
        self.sessions.lock().await.get(id).cloned()
    }

    /// Fan a capability query out to every eligible server.
    ///
    /// Candidates are the enabled registry entries advertising
    /// `capability`, dispatched in descending priority order (ties keep
    /// registration order). Each candidate's call runs concurrently inside
    /// its server's breaker and retry guards; all candidates settle before
    /// the outcome is assembled, in completion order. This is fan-out, not
    /// first-wins: nothing short-circuits on the first failure or success.
    ///
    /// Successes are forwarded to the knowledge sink as a side effect;
    /// sink failures are logged and do not alter the returned outcome.
    pub async fn query(&self, capability: &str, args: serde_json::Value) -> QueryOutcome {
        let ctx = RequestContext::new(capability, args.clone());
        let candidates = self.registry.candidates_for(capability);
        tracing::debug!(
            capability,
            query_id = %ctx.query_id,
            candidates = candidates.len(),
            "fanning out"
        );

        let mut calls = FuturesUnordered::new();
        for server in candidates {
            let id = server.id().to_string();
            let session = self.sessions.lock().await.get(&id).cloned();
            let guard = self.guard_for(&id).await;
            let capability = capability.to_string();
            let args = args.clone();

            calls.push(async move {
                let result = match session {
                    Some(session) => {
                        guard
                            .breaker
                            .execute(|| {
                                guard.retry.execute(|| {
                                    let session = Arc::clone(&session);
                                    let capability = capability.clone();
                                    let args = args.clone();
                                    async move { session.call_tool(&capability, Some(args)).await }
                                })
                            })
                            .await
                    }
                    None => Err(anyhow::anyhow!(FleetError::NotReady(id.clone()))),
                };
                (id, result)
            });
        }

        let mut outcome = QueryOutcome::default();
        while let Some((server_id, result)) = calls.next().await {
            match result {
                Ok(result) => outcome.successful.push(ServerSuccess { server_id, result }),
                Err(e) => {
                    tracing::debug!(server = %server_id, "candidate failed: {e}");
                    outcome.failed.push(ServerFailure {
                        server_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        for success in &outcome.successful {
            let Some(server) = self.registry.get(&success.server_id) else {
                continue;
            };
            let node = KnowledgeNode::new(
                success.server_id.clone(),
                capability,
                success.result.clone(),
            );
            if let Err(e) = self
                .knowledge
                .add_response_node(&server.definition, &ctx, node)
                .await
            {
                tracing::warn!(
                    server = %success.server_id,
                    query_id = %ctx.query_id,
                    "knowledge sink rejected response node: {e}"
                );
            }
        }

        tracing::info!(
            capability,
            query_id = %ctx.query_id,
            ok = outcome.successful.len(),
            failed = outcome.failed.len(),
            "query settled"
        );
        outcome
    }

    /// Tear the fleet down: close sessions, then stop every supervised
    /// process.
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<ToolSession>> = {
            let mut map = self.sessions.lock().await;
            map.drain().map(|(_, s)| s).collect()
        };
        for session in sessions {
            session.close();
        }
        self.supervisor.dispose_all().await;
    }

    /// The breaker/retry pairing for `id`, created on first use.
    ///
    /// Granularity is per server: one misbehaving capability quarantines
    /// the whole server, matching the process-level failure domain.
    async fn guard_for(&self, id: &str) -> Arc<ServerGuard> {
        let mut guards = self.guards.lock().await;
        guards
            .entry(id.to_string())
            .or_insert_with(|| {
                Arc::new(ServerGuard {
                    breaker: CircuitBreaker::new(id, self.settings.breaker.clone()),
                    retry: self.settings.retry.clone(),
                })
            })
            .clone()
    }

    /// Install a pre-wired session, bypassing transport construction.
    #[cfg(test)]
    pub(crate) async fn attach_session(&self, id: &str, session: Arc<ToolSession>) {
        self.sessions.lock().await.insert(id.to_string(), session);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
