//! Knowledge persistence boundary
//!
//! Successful fan-out responses are forwarded out of the orchestrator as
//! [`KnowledgeNode`]s through the [`KnowledgeSink`] trait. The sink is an
//! injected collaborator: the fleet ships an in-memory implementation, and
//! hosts persist nodes wherever they like by implementing the trait.
//!
//! A sink failure never alters a query's outcome; the orchestrator logs it
//! and moves on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::orchestrator::RequestContext;
use crate::registry::ServerDefinition;

/// One captured server response with its provenance.
#[derive(Debug, Clone)]
pub struct KnowledgeNode {
    /// Id of the server that produced the response.
    pub server_id: String,
    /// The capability the query asked for.
    pub capability: String,
    /// The raw response content.
    pub content: serde_json::Value,
    /// When the response was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl KnowledgeNode {
    /// Build a node stamped with the current time.
    pub fn new(server_id: impl Into<String>, capability: impl Into<String>, content: serde_json::Value) -> Self {
        Self {
            server_id: server_id.into(),
            capability: capability.into(),
            content,
            recorded_at: Utc::now(),
        }
    }
}

/// Where successful fan-out responses are persisted.
#[async_trait]
pub trait KnowledgeSink: Send + Sync {
    /// Record one successful server response.
    ///
    /// Called once per success, after the query outcome is already
    /// determined; implementations must not assume their failure blocks
    /// anything.
    ///
    /// # Arguments
    ///
    /// * `server` - Definition of the responding server.
    /// * `ctx` - The query context the response belongs to.
    /// * `node` - The response content plus provenance.
    ///
    /// # Errors
    ///
    /// Implementations may fail; the orchestrator logs and continues.
    async fn add_response_node(
        &self,
        server: &ServerDefinition,
        ctx: &RequestContext,
        node: KnowledgeNode,
    ) -> Result<()>;
}

/// In-memory sink; the default collaborator and the test double.
#[derive(Debug, Default)]
pub struct MemoryKnowledgeStore {
    nodes: Mutex<Vec<KnowledgeNode>>,
}

impl MemoryKnowledgeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded nodes.
    pub async fn nodes(&self) -> Vec<KnowledgeNode> {
        self.nodes.lock().await.clone()
    }

    /// Number of recorded nodes.
    pub async fn len(&self) -> usize {
        self.nodes.lock().await.len()
    }

    /// Whether the store holds no nodes.
    pub async fn is_empty(&self) -> bool {
        self.nodes.lock().await.is_empty()
    }
}

#[async_trait]
impl KnowledgeSink for MemoryKnowledgeStore {
    async fn add_response_node(
        &self,
        _server: &ServerDefinition,
        _ctx: &RequestContext,
        node: KnowledgeNode,
    ) -> Result<()> {
        self.nodes.lock().await.push(node);
        Ok(())
    }
}
