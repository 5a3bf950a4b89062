//! Configuration management for toolfleet
//!
//! Server definitions come from two YAML sources: a built-in system list
//! and an optional user override file. The two are merged by an explicit
//! function: system entries come first, user entries overlay matching ids
//! field by field, and unmatched user entries are appended. Per-server
//! enabled/disabled state is persisted externally (a small YAML map) and
//! merged in at load time; system servers default to enabled, user servers
//! to disabled.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FleetError, Result};
use crate::registry::{
    LaunchSpec, ManagedServer, ServerDefinition, ServerOrigin, ServerRegistry, TransportKind,
};

/// One server definition as written in a config file.
///
/// Every field except `id` is optional so that a user entry can overlay
/// just the fields it wants to change on a system entry with the same id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawServerDefinition {
    /// Unique server id; the overlay key.
    pub id: String,
    /// Human-readable name; defaults to the id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Human-readable description; derived from the name when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Transport protocol; defaults to `ipc`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<TransportKind>,
    /// Launch spec for `ipc` servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<LaunchSpec>,
    /// Endpoint URL for `http` servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<url::Url>,
    /// Capabilities the server advertises.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<BTreeSet<String>>,
    /// Selection priority; higher wins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Shape of the user override file: `servers:` followed by a list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServersFile {
    /// User-supplied definitions.
    #[serde(default)]
    pub servers: Vec<RawServerDefinition>,
}

/// Shape of the externally-persisted enabled-state file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateFile {
    /// Per-server enabled overrides, keyed by id.
    #[serde(default)]
    pub enabled: HashMap<String, bool>,
}

/// The built-in system definition list.
///
/// Embedders extend this list when they ship servers of their own; a lone
/// loopback utility server keeps the default fleet non-empty.
pub fn system_definitions() -> Vec<RawServerDefinition> {
    vec![RawServerDefinition {
        id: "local-echo".to_string(),
        name: Some("Local Echo".to_string()),
        description: Some("Loopback utility server for wiring checks".to_string()),
        protocol: Some(TransportKind::Ipc),
        run: Some(LaunchSpec {
            command: "fleet-echo-server".to_string(),
            args: vec![],
            env: HashMap::new(),
        }),
        endpoint: None,
        capabilities: Some(BTreeSet::from(["echo".to_string()])),
        priority: Some(0),
        tags: Some(vec!["builtin".to_string()]),
    }]
}

/// Merge the system list with user overrides.
///
/// Semantics:
/// - System entries keep their relative order.
/// - A user entry whose id matches a system entry overlays it field by
///   field (a `Some` user field wins, a `None` keeps the system value);
///   the result keeps `System` origin since the system shipped it.
/// - User entries with fresh ids are appended in file order with `User`
///   origin.
pub fn merge_definitions(
    system: Vec<RawServerDefinition>,
    user: Vec<RawServerDefinition>,
) -> Vec<(RawServerDefinition, ServerOrigin)> {
    let mut merged: Vec<(RawServerDefinition, ServerOrigin)> = system
        .into_iter()
        .map(|raw| (raw, ServerOrigin::System))
        .collect();

    for overlay in user {
        match merged.iter_mut().find(|(base, _)| base.id == overlay.id) {
            Some((base, _)) => overlay_definition(base, overlay),
            None => merged.push((overlay, ServerOrigin::User)),
        }
    }
    merged
}

/// Overlay `user` onto `base` field by key.
fn overlay_definition(base: &mut RawServerDefinition, user: RawServerDefinition) {
    if user.name.is_some() {
        base.name = user.name;
    }
    if user.description.is_some() {
        base.description = user.description;
    }
    if user.protocol.is_some() {
        base.protocol = user.protocol;
    }
    if user.run.is_some() {
        base.run = user.run;
    }
    if user.endpoint.is_some() {
        base.endpoint = user.endpoint;
    }
    if user.capabilities.is_some() {
        base.capabilities = user.capabilities;
    }
    if user.priority.is_some() {
        base.priority = user.priority;
    }
    if user.tags.is_some() {
        base.tags = user.tags;
    }
}

/// Resolve a raw definition into a concrete [`ServerDefinition`].
///
/// # Errors
///
/// Returns [`FleetError::Config`] when an `ipc` definition has no launch
/// spec or an `http` definition has no endpoint.
fn resolve_definition(raw: RawServerDefinition) -> Result<ServerDefinition> {
    let name = raw.name.unwrap_or_else(|| raw.id.clone());

    // Derive-if-absent is a deliberate branch, not a serialization accident.
    let description = match raw.description {
        Some(d) => d,
        None => format!("{name} tool server"),
    };

    let transport = raw.protocol.unwrap_or(TransportKind::Ipc);
    match transport {
        TransportKind::Ipc if raw.run.is_none() => {
            return Err(anyhow::anyhow!(FleetError::Config(format!(
                "ipc server `{}` has no run command",
                raw.id
            ))));
        }
        TransportKind::Http if raw.endpoint.is_none() => {
            return Err(anyhow::anyhow!(FleetError::Config(format!(
                "http server `{}` has no endpoint",
                raw.id
            ))));
        }
        _ => {}
    }

    Ok(ServerDefinition {
        id: raw.id,
        name,
        description,
        transport,
        launch: raw.run,
        endpoint: raw.endpoint,
        capabilities: raw.capabilities.unwrap_or_default(),
        priority: raw.priority.unwrap_or(0),
        tags: raw.tags.unwrap_or_default(),
    })
}

/// Fully loaded fleet configuration.
#[derive(Debug, Default)]
pub struct FleetConfig {
    /// Resolved servers with their enabled state applied.
    pub servers: Vec<ManagedServer>,
}

impl FleetConfig {
    /// Load and merge the system list, the user override file, and the
    /// enabled-state file.
    ///
    /// A missing user or state file is treated as empty, not an error.
    /// Defaults before the state overlay: system servers enabled, user
    /// servers disabled. State entries for unknown ids are ignored.
    ///
    /// # Arguments
    ///
    /// * `user_path` - Optional path to the user's `servers.yaml`.
    /// * `state_path` - Optional path to the enabled-state file.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Yaml`] on unparseable files and
    /// [`FleetError::Config`] on invalid definitions.
    pub fn load(user_path: Option<&Path>, state_path: Option<&Path>) -> Result<Self> {
        let user = match user_path {
            Some(p) if p.exists() => {
                let text = std::fs::read_to_string(p).map_err(FleetError::Io)?;
                let file: ServersFile = serde_yaml::from_str(&text).map_err(FleetError::Yaml)?;
                file.servers
            }
            _ => Vec::new(),
        };

        let state = match state_path {
            Some(p) if p.exists() => {
                let text = std::fs::read_to_string(p).map_err(FleetError::Io)?;
                serde_yaml::from_str::<StateFile>(&text).map_err(FleetError::Yaml)?
            }
            _ => StateFile::default(),
        };

        Self::assemble(system_definitions(), user, state)
    }

    /// Pure assembly from in-memory pieces; the testable core of `load`.
    pub fn assemble(
        system: Vec<RawServerDefinition>,
        user: Vec<RawServerDefinition>,
        state: StateFile,
    ) -> Result<Self> {
        let mut servers = Vec::new();
        for (raw, origin) in merge_definitions(system, user) {
            let id = raw.id.clone();
            let definition = resolve_definition(raw)?;
            let default_enabled = origin == ServerOrigin::System;
            let enabled = state.enabled.get(&id).copied().unwrap_or(default_enabled);
            servers.push(ManagedServer {
                definition,
                enabled,
                origin,
            });
        }
        Ok(Self { servers })
    }

    /// Build a registry from the loaded servers.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Config`] on duplicate ids.
    pub fn into_registry(self) -> Result<ServerRegistry> {
        let mut registry = ServerRegistry::new();
        for server in self.servers {
            registry.register(server)?;
        }
        Ok(registry)
    }
}

/// Default location of the user's server override file.
pub fn default_servers_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "toolfleet")
        .map(|dirs| dirs.config_dir().join("servers.yaml"))
}

/// Default location of the enabled-state file.
pub fn default_state_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "toolfleet")
        .map(|dirs| dirs.config_dir().join("state.yaml"))
}
