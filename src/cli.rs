//! Command-line interface definition for toolfleet
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for inspecting the fleet and fanning queries out.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// toolfleet - fan-out orchestrator for JSON-RPC tool servers
///
/// Supervises a fleet of tool servers, fans capability queries out to
/// every server advertising them, and aggregates partial success.
#[derive(Parser, Debug, Clone)]
#[command(name = "toolfleet")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the user server override file (servers.yaml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to the enabled-state file (state.yaml)
    #[arg(long)]
    pub state: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for toolfleet
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List configured servers with their state and capabilities
    Servers,

    /// Connect to one server and list the tools it advertises
    Tools {
        /// Server id to inspect
        #[arg(short, long)]
        server: String,
    },

    /// Fan a capability query out across the fleet
    Query {
        /// Capability to query (also the tool name sent to each server)
        capability: String,

        /// JSON arguments for the tool call
        #[arg(short, long, default_value = "{}")]
        args: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
