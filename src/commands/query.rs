//! `toolfleet query` -- fan a capability query out across the fleet

use std::sync::Arc;

use crate::config::FleetConfig;
use crate::error::{FleetError, Result};
use crate::knowledge::MemoryKnowledgeStore;
use crate::orchestrator::{Orchestrator, OrchestratorSettings};

/// Connect every enabled server, fan the query out, and print the
/// aggregated outcome.
///
/// Total failure (no server answered) and degraded success (some did) are
/// reported distinctly; neither is a process error.
pub async fn run(config: FleetConfig, capability: &str, raw_args: &str) -> Result<()> {
    let args: serde_json::Value = serde_json::from_str(raw_args)
        .map_err(|e| anyhow::anyhow!(FleetError::Config(format!("--args is not valid JSON: {e}"))))?;

    let registry = config.into_registry()?;
    let orchestrator = Orchestrator::new(
        registry,
        Arc::new(MemoryKnowledgeStore::new()),
        OrchestratorSettings::default(),
    );

    orchestrator.connect_all().await;
    let outcome = orchestrator.query(capability, args).await;
    orchestrator.shutdown().await;

    for success in &outcome.successful {
        println!(
            "{}: {}",
            success.server_id,
            serde_json::to_string_pretty(&success.result)?
        );
    }
    for failure in &outcome.failed {
        eprintln!("{}: FAILED: {}", failure.server_id, failure.error);
    }

    if outcome.successful.is_empty() && outcome.failed.is_empty() {
        println!("no enabled server advertises `{capability}`");
    } else if outcome.is_total_failure() {
        eprintln!("total failure: no server produced a result");
    } else if outcome.is_degraded() {
        eprintln!(
            "degraded success: {}/{} servers answered",
            outcome.successful.len(),
            outcome.successful.len() + outcome.failed.len()
        );
    }

    Ok(())
}
