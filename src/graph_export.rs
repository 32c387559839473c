//! Serializable registry snapshots for visualization and debugging
//! tooling.
//!
//! Enabled with the `graph-export` feature.

use serde::{Deserialize, Serialize};

use crate::registration::{InstanceOwnership, InstanceSharing};
use crate::scope::LifetimeScope;

/// One registration in the exported graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    /// The registration's stable id.
    pub id: u64,
    /// Display forms of the services the registration provides.
    pub services: Vec<String>,
    /// Display form of the lifetime strategy.
    pub lifetime: String,
    /// Whether instances are shared within their activation scope.
    pub shared: bool,
    /// Whether the activation scope owns disposal.
    pub owned_by_scope: bool,
    /// The registration's metadata keys.
    pub metadata_keys: Vec<String>,
}

/// A snapshot of every registration visible from a scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyGraph {
    /// The scope tag the snapshot was taken from.
    pub scope: String,
    /// The registrations, ordered by id.
    pub nodes: Vec<GraphNode>,
}

impl DependencyGraph {
    /// Captures the registrations visible from `scope`.
    ///
    /// Only services that have been registered or already observed by a
    /// resolve appear; sources contribute their synthesized registrations
    /// once queried.
    pub fn from_scope(scope: &LifetimeScope) -> Self {
        let nodes = scope
            .registry()
            .registration_snapshot()
            .into_iter()
            .map(|registration| GraphNode {
                id: registration.id().value(),
                services: registration
                    .services()
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                lifetime: registration.lifetime().to_string(),
                shared: registration.sharing() == InstanceSharing::Shared,
                owned_by_scope: registration.ownership()
                    == InstanceOwnership::OwnedByLifetimeScope,
                metadata_keys: registration
                    .metadata()
                    .keys()
                    .map(|k| k.to_string())
                    .collect(),
            })
            .collect();

        Self {
            scope: scope.tag().to_string(),
            nodes,
        }
    }

    /// Serializes the snapshot as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Renders the snapshot in Graphviz DOT form, one node per
    /// registration.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph registry {\n");
        for node in &self.nodes {
            let label = node.services.join("\\n");
            out.push_str(&format!(
                "    r{} [label=\"{}\\n[{}{}]\"];\n",
                node.id,
                label,
                node.lifetime,
                if node.shared { ", shared" } else { "" },
            ));
        }
        out.push_str("}\n");
        out
    }
}
