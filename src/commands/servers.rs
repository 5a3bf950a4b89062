//! `toolfleet servers` -- list the configured fleet

use crate::config::FleetConfig;
use crate::error::Result;

/// Print one line per configured server: id, state, origin, transport,
/// priority, capabilities.
pub fn run(config: FleetConfig) -> Result<()> {
    if config.servers.is_empty() {
        println!("no servers configured");
        return Ok(());
    }

    for server in &config.servers {
        let def = &server.definition;
        let state = if server.enabled { "enabled" } else { "disabled" };
        let capabilities = def
            .capabilities
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{:<20} {:<9} {:<7} {:?}  priority={}  [{}]",
            def.id, state, format!("{:?}", server.origin).to_lowercase(), def.transport, def.priority, capabilities
        );
    }
    Ok(())
}
