//! toolfleet - fan-out orchestrator CLI
//!
//! Main entry point for the toolfleet command-line tool.

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use toolfleet::cli::{Cli, Commands};
use toolfleet::commands;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse_args();
    let config = commands::load_config(&cli)?;

    match cli.command {
        Commands::Servers => commands::servers::run(config),
        Commands::Tools { server } => {
            tracing::info!("inspecting tools of `{server}`");
            commands::tools::run(config, &server).await
        }
        Commands::Query { capability, args } => {
            tracing::info!("querying capability `{capability}`");
            commands::query::run(config, &capability, &args).await
        }
    }
}

/// Initialize tracing subscriber with environment filter
fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("toolfleet=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
