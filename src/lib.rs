//! toolfleet - fault-tolerant fan-out orchestration for tool servers
//!
//! This library coordinates calls to multiple independently-running tool
//! servers (local child processes or remote HTTP endpoints) speaking a
//! JSON-RPC based protocol, tolerating servers that are slow, unreachable,
//! or flapping.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `registry`: Server definitions and the fleet registry
//! - `process`: Process supervisor for `ipc` servers (process groups)
//! - `ports`: Ephemeral port reservation
//! - `rpc`: Transports, JSON-RPC correlation client, per-server sessions
//! - `resilience`: Circuit breaker and retry-with-backoff guards
//! - `orchestrator`: Capability fan-out and partial-result aggregation
//! - `knowledge`: Persistence boundary for successful responses
//! - `config`: System/user definition merging and enabled-state overlay
//! - `error`: Error types and result alias
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use toolfleet::config::FleetConfig;
//! use toolfleet::knowledge::MemoryKnowledgeStore;
//! use toolfleet::orchestrator::{Orchestrator, OrchestratorSettings};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = FleetConfig::load(None, None)?.into_registry()?;
//!     let orchestrator = Orchestrator::new(
//!         registry,
//!         Arc::new(MemoryKnowledgeStore::new()),
//!         OrchestratorSettings::default(),
//!     );
//!
//!     orchestrator.connect_all().await;
//!     let outcome = orchestrator.query("echo", serde_json::json!({"q": "hi"})).await;
//!     println!("{} ok, {} failed", outcome.successful.len(), outcome.failed.len());
//!
//!     orchestrator.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod orchestrator;
pub mod ports;
pub mod process;
pub mod registry;
pub mod resilience;
pub mod rpc;

// Re-export commonly used types
pub use error::{FleetError, Result};
pub use knowledge::{KnowledgeNode, KnowledgeSink, MemoryKnowledgeStore};
pub use orchestrator::{Orchestrator, OrchestratorSettings, QueryOutcome};
pub use registry::{ManagedServer, ServerDefinition, ServerRegistry};
