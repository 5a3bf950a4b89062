//! Command handlers for the toolfleet CLI
//!
//! Each submodule implements one subcommand: thin glue that loads the
//! configuration, builds the orchestrator, runs, and prints.

pub mod query;
pub mod servers;
pub mod tools;

use std::path::PathBuf;

use crate::cli::Cli;
use crate::config::{default_servers_path, default_state_path, FleetConfig};
use crate::error::Result;

/// Resolve the config/state paths from CLI flags or platform defaults and
/// load the fleet configuration.
pub fn load_config(cli: &Cli) -> Result<FleetConfig> {
    let servers_path: Option<PathBuf> = cli.config.clone().or_else(default_servers_path);
    let state_path: Option<PathBuf> = cli.state.clone().or_else(default_state_path);
    FleetConfig::load(servers_path.as_deref(), state_path.as_deref())
}
