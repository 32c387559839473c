#![cfg(feature = "graph-export")]

use lattice_di::graph_export::DependencyGraph;
use lattice_di::{provide, RegistryBuilder};

struct Config;
struct Worker;

#[test]
fn snapshot_lists_registrations_with_their_policies() {
    let mut builder = RegistryBuilder::new();
    builder
        .register(provide::<Config>(|_| Ok(Config)).single_instance())
        .unwrap();
    builder
        .register(
            provide::<Worker>(|_| Ok(Worker)).with_metadata("role", "background".to_string()),
        )
        .unwrap();
    let root = builder.build_container().unwrap();

    let graph = DependencyGraph::from_scope(&root);
    assert_eq!(graph.scope, "root");
    assert_eq!(graph.nodes.len(), 2);

    let config = graph
        .nodes
        .iter()
        .find(|n| n.services.iter().any(|s| s.contains("Config")))
        .unwrap();
    assert!(config.shared);
    assert_eq!(config.lifetime, "root scope");

    let worker = graph
        .nodes
        .iter()
        .find(|n| n.services.iter().any(|s| s.contains("Worker")))
        .unwrap();
    assert!(!worker.shared);
    assert_eq!(worker.metadata_keys, vec!["role".to_string()]);
}

#[test]
fn snapshot_serializes_to_json_and_dot() {
    let mut builder = RegistryBuilder::new();
    builder
        .register(provide::<Config>(|_| Ok(Config)).single_instance())
        .unwrap();
    let root = builder.build_container().unwrap();

    let graph = DependencyGraph::from_scope(&root);
    let json = graph.to_json().unwrap();
    assert!(json.contains("\"nodes\""));

    let dot = graph.to_dot();
    assert!(dot.starts_with("digraph registry {"));
    assert!(dot.contains("Config"));
}
