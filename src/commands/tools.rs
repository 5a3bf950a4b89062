//! `toolfleet tools` -- inspect one server's advertised tools

use std::sync::Arc;

use crate::config::FleetConfig;
use crate::error::{FleetError, Result};
use crate::knowledge::MemoryKnowledgeStore;
use crate::orchestrator::{Orchestrator, OrchestratorSettings};

/// Connect to `server_id`, run the handshake, and print the discovered
/// tool descriptors.
pub async fn run(config: FleetConfig, server_id: &str) -> Result<()> {
    let registry = config.into_registry()?;
    let orchestrator = Orchestrator::new(
        registry,
        Arc::new(MemoryKnowledgeStore::new()),
        OrchestratorSettings::default(),
    );

    orchestrator.connect(server_id).await?;
    let session = orchestrator
        .session(server_id)
        .await
        .ok_or_else(|| anyhow::anyhow!(FleetError::NotReady(server_id.to_string())))?;

    if !session.is_ready() {
        orchestrator.shutdown().await;
        return Err(anyhow::anyhow!(FleetError::NotReady(server_id.to_string())));
    }

    let tools = session.tools().await;
    if tools.is_empty() {
        println!("{server_id}: no tools advertised");
    }
    for tool in tools {
        match &tool.description {
            Some(d) => println!("{:<24} {}", tool.name, d),
            None => println!("{}", tool.name),
        }
    }

    orchestrator.shutdown().await;
    Ok(())
}
