//! Server definitions and the fleet registry
//!
//! A [`ServerDefinition`] describes one tool server: identity, transport
//! kind, how to launch it (or where to reach it), the capabilities it
//! advertises, and its selection priority. Definitions are immutable once
//! registered; runtime state (enabled flag, origin) lives on the wrapping
//! [`ManagedServer`].
//!
//! The [`ServerRegistry`] is the single source of truth the orchestrator
//! queries to resolve which servers can serve a capability. It preserves
//! registration order, which breaks priority ties deterministically.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{FleetError, Result};

/// How the fleet reaches a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Local child process speaking newline-delimited JSON over stdio.
    Ipc,
    /// Remote endpoint receiving one HTTP POST per message.
    Http,
}

/// Launch specification for an `ipc` server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    /// Executable to spawn.
    pub command: String,
    /// Command-line arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment overlay applied on top of the inherited environment.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Where a definition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerOrigin {
    /// Shipped with the fleet's built-in configuration.
    System,
    /// Supplied by the user's override file.
    User,
}

/// Immutable description of one tool server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerDefinition {
    /// Unique id; registry key.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Transport kind.
    pub transport: TransportKind,
    /// Launch spec; required for `ipc` servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch: Option<LaunchSpec>,
    /// Endpoint URL; required for `http` servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<url::Url>,
    /// Capabilities this server advertises; fan-out selection key.
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Selection priority; higher wins when multiple servers satisfy a
    /// capability.
    #[serde(default)]
    pub priority: i32,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ServerDefinition {
    /// Whether this definition advertises `capability`.
    pub fn advertises(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

/// A registered server: immutable definition plus runtime state.
#[derive(Debug, Clone)]
pub struct ManagedServer {
    /// The immutable definition.
    pub definition: ServerDefinition,
    /// Whether the orchestrator may route queries to this server.
    pub enabled: bool,
    /// Where the definition came from.
    pub origin: ServerOrigin,
}

impl ManagedServer {
    /// The server's id.
    pub fn id(&self) -> &str {
        &self.definition.id
    }
}

/// Insertion-ordered mapping from server id to [`ManagedServer`].
///
/// Mutated only through explicit register/deregister/enable/disable
/// operations, never by in-flight queries.
#[derive(Debug, Default)]
pub struct ServerRegistry {
    servers: Vec<ManagedServer>,
}

impl ServerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a server.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Config`] if a server with the same id is
    /// already registered.
    pub fn register(&mut self, server: ManagedServer) -> Result<()> {
        if self.get(server.id()).is_some() {
            return Err(anyhow::anyhow!(FleetError::Config(format!(
                "duplicate server id `{}`",
                server.id()
            ))));
        }
        self.servers.push(server);
        Ok(())
    }

    /// Remove a server by id; returns the removed entry, if any.
    pub fn deregister(&mut self, id: &str) -> Option<ManagedServer> {
        let pos = self.servers.iter().position(|s| s.id() == id)?;
        Some(self.servers.remove(pos))
    }

    /// Look up a server by id.
    pub fn get(&self, id: &str) -> Option<&ManagedServer> {
        self.servers.iter().find(|s| s.id() == id)
    }

    /// Set a server's enabled flag; returns false when the id is unknown.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> bool {
        match self.servers.iter_mut().find(|s| s.id() == id) {
            Some(s) => {
                s.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// All registered servers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ManagedServer> {
        self.servers.iter()
    }

    /// Number of registered servers.
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Enabled servers advertising `capability`, ordered by descending
    /// priority; ties keep registration order (stable sort).
    pub fn candidates_for(&self, capability: &str) -> Vec<&ManagedServer> {
        let mut candidates: Vec<&ManagedServer> = self
            .servers
            .iter()
            .filter(|s| s.enabled && s.definition.advertises(capability))
            .collect();
        candidates.sort_by_key(|s| std::cmp::Reverse(s.definition.priority));
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(id: &str, capabilities: &[&str], priority: i32) -> ServerDefinition {
        ServerDefinition {
            id: id.to_string(),
            name: id.to_string(),
            description: format!("{id} tool server"),
            transport: TransportKind::Ipc,
            launch: Some(LaunchSpec {
                command: "true".to_string(),
                args: vec![],
                env: HashMap::new(),
            }),
            endpoint: None,
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            priority,
            tags: vec![],
        }
    }

    fn managed(id: &str, capabilities: &[&str], priority: i32) -> ManagedServer {
        ManagedServer {
            definition: definition(id, capabilities, priority),
            enabled: true,
            origin: ServerOrigin::System,
        }
    }

    #[test]
    fn test_register_rejects_duplicate_id() {
        let mut registry = ServerRegistry::new();
        registry.register(managed("a", &["docs"], 0)).unwrap();
        let err = registry.register(managed("a", &["docs"], 0)).unwrap_err();
        assert!(err.to_string().contains("duplicate server id"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_deregister_removes_entry() {
        let mut registry = ServerRegistry::new();
        registry.register(managed("a", &["docs"], 0)).unwrap();
        assert!(registry.deregister("a").is_some());
        assert!(registry.deregister("a").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_candidates_filtered_by_capability_and_enabled() {
        let mut registry = ServerRegistry::new();
        registry.register(managed("a", &["docs"], 0)).unwrap();
        registry.register(managed("b", &["search"], 0)).unwrap();
        let mut disabled = managed("c", &["docs"], 0);
        disabled.enabled = false;
        registry.register(disabled).unwrap();

        let candidates = registry.candidates_for("docs");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id(), "a");
    }

    #[test]
    fn test_candidates_ordered_by_priority_desc_then_registration() {
        let mut registry = ServerRegistry::new();
        registry.register(managed("low", &["docs"], 1)).unwrap();
        registry.register(managed("high", &["docs"], 10)).unwrap();
        registry.register(managed("tied-first", &["docs"], 5)).unwrap();
        registry.register(managed("tied-second", &["docs"], 5)).unwrap();

        let ids: Vec<&str> = registry
            .candidates_for("docs")
            .iter()
            .map(|s| s.id())
            .collect();
        assert_eq!(ids, vec!["high", "tied-first", "tied-second", "low"]);
    }

    #[test]
    fn test_set_enabled_toggles_and_reports_unknown() {
        let mut registry = ServerRegistry::new();
        registry.register(managed("a", &["docs"], 0)).unwrap();

        assert!(registry.set_enabled("a", false));
        assert!(registry.candidates_for("docs").is_empty());
        assert!(registry.set_enabled("a", true));
        assert_eq!(registry.candidates_for("docs").len(), 1);
        assert!(!registry.set_enabled("ghost", true));
    }
}
