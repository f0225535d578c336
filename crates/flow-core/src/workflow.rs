use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::atom::AtomContract;
use crate::error::{CoreError, CoreReason};
use crate::registry::AtomRegistry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: String,
    #[serde(rename = "atomName", alias = "manifestName", alias = "atom_name")]
    pub atom_name: String,
    #[serde(default)]
    pub config: serde_json::Value,
    /// `any` (default) fires on the first of its trigger signals; `all`
    /// requires every distinct incoming signal name since the last firing.
    #[serde(default)]
    pub trigger_mode: TriggerMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    #[default]
    Any,
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEdge {
    #[serde(rename = "source", alias = "sourceNodeId", alias = "source_node")]
    pub source_node: String,
    #[serde(rename = "signal", alias = "signalKey", alias = "signal_name")]
    pub signal_name: String,
    #[serde(rename = "target", alias = "targetNodeId", alias = "target_node")]
    pub target_node: String,
    #[serde(default)]
    pub allow_self_edge: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    pub nodes: Vec<WorkflowNode>,
    pub edges: Vec<WorkflowEdge>,
}

/// Precompiled view used by the scheduler: for each node, the distinct
/// signal names that can trigger it and its trigger mode.
#[derive(Debug, Clone)]
pub struct TriggerPredicate {
    pub signal_names: Vec<String>,
    pub mode: TriggerMode,
}

/// The validated, indexed form of a [`WorkflowDefinition`] ready for
/// scheduling: emitters index, per-node trigger predicates, and the set of
/// edges annotated as cycle-forming.
pub struct CompiledWorkflow {
    pub definition: WorkflowDefinition,
    pub emitters: HashMap<String, Vec<String>>,
    pub triggers: HashMap<String, TriggerPredicate>,
    pub cycle_edges: HashSet<(String, String)>,
}

impl WorkflowDefinition {
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Validate against the atom registry and compile the scheduler's
    /// emitter index and trigger predicates.
    pub fn compile(self, registry: &AtomRegistry) -> Result<CompiledWorkflow, CoreError> {
        let mut node_ids = HashSet::new();
        let mut node_atoms: HashMap<&str, &AtomContract> = HashMap::new();

        for node in &self.nodes {
            if !node_ids.insert(node.id.as_str()) {
                return Err(invalid(format!("duplicate node id {}", node.id)));
            }
            let (contract, _executor) = registry.get(&node.atom_name)?;
            node_atoms.insert(node.id.as_str(), contract);
        }

        let mut seen_edges = HashSet::new();
        let mut deduped_edges = Vec::new();
        for edge in &self.edges {
            let key = (
                edge.source_node.clone(),
                edge.signal_name.clone(),
                edge.target_node.clone(),
            );
            if !seen_edges.insert(key) {
                continue;
            }

            if edge.source_node == edge.target_node && !edge.allow_self_edge {
                return Err(invalid(format!(
                    "self-edge on node {} not explicitly allowed",
                    edge.source_node
                )));
            }

            let source = node_atoms.get(edge.source_node.as_str()).ok_or_else(|| {
                invalid(format!("edge references unknown source node {}", edge.source_node))
            })?;
            let target = node_atoms.get(edge.target_node.as_str()).ok_or_else(|| {
                invalid(format!("edge references unknown target node {}", edge.target_node))
            })?;

            if !source.writes_signal(&edge.signal_name) {
                return Err(invalid(format!(
                    "node {} does not write signal {}",
                    edge.source_node, edge.signal_name
                )));
            }
            if !target.reads_signal(&edge.signal_name) {
                return Err(invalid(format!(
                    "node {} cannot consume signal {}",
                    edge.target_node, edge.signal_name
                )));
            }

            deduped_edges.push(edge.clone());
        }

        let mut emitters: HashMap<String, Vec<String>> = HashMap::new();
        let mut incoming: HashMap<String, Vec<String>> = HashMap::new();
        for edge in &deduped_edges {
            emitters
                .entry(edge.signal_name.clone())
                .or_default()
                .push(edge.target_node.clone());
            incoming
                .entry(edge.target_node.clone())
                .or_default()
                .push(edge.signal_name.clone());
        }

        let mut triggers = HashMap::new();
        for node in &self.nodes {
            let mut signal_names = incoming.remove(&node.id).unwrap_or_default();
            signal_names.sort();
            signal_names.dedup();
            triggers.insert(
                node.id.clone(),
                TriggerPredicate {
                    signal_names,
                    mode: node.trigger_mode,
                },
            );
        }

        let cycle_edges = detect_cycle_edges(&self.nodes, &deduped_edges);

        Ok(CompiledWorkflow {
            definition: WorkflowDefinition {
                id: self.id,
                nodes: self.nodes,
                edges: deduped_edges,
            },
            emitters,
            triggers,
            cycle_edges,
        })
    }
}

fn invalid(message: String) -> CoreError {
    CoreError::from(CoreReason::InvalidWorkflow(message))
}

/// DFS-based back-edge detection over the node→node graph induced by edges.
/// A back edge (pointing to an ancestor still on the DFS stack) is reported
/// as a cycle edge; the scheduler enforces the per-run depth bound on it.
fn detect_cycle_edges(
    nodes: &[WorkflowNode],
    edges: &[WorkflowEdge],
) -> HashSet<(String, String)> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        adjacency
            .entry(edge.source_node.as_str())
            .or_default()
            .push(edge.target_node.as_str());
    }

    #[derive(PartialEq, Clone, Copy)]
    enum Mark {
        Unvisited,
        OnStack,
        Done,
    }

    let mut mark: HashMap<&str, Mark> = nodes.iter().map(|n| (n.id.as_str(), Mark::Unvisited)).collect();
    let mut cycle_edges = HashSet::new();

    fn visit<'a>(
        node: &'a str,
        adjacency: &HashMap<&'a str, Vec<&'a str>>,
        mark: &mut HashMap<&'a str, Mark>,
        cycle_edges: &mut HashSet<(String, String)>,
    ) {
        mark.insert(node, Mark::OnStack);
        if let Some(children) = adjacency.get(node) {
            for &child in children {
                match mark.get(child).copied().unwrap_or(Mark::Unvisited) {
                    Mark::Unvisited => visit(child, adjacency, mark, cycle_edges),
                    Mark::OnStack => {
                        cycle_edges.insert((node.to_string(), child.to_string()));
                    }
                    Mark::Done => {}
                }
            }
        }
        mark.insert(node, Mark::Done);
    }

    for node in nodes {
        if mark.get(node.id.as_str()).copied().unwrap_or(Mark::Unvisited) == Mark::Unvisited {
            visit(node.id.as_str(), &adjacency, &mut mark, &mut cycle_edges);
        }
    }

    cycle_edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::{AtomKind, Lane, RunContext};
    use crate::error::CoreResult;
    use crate::gate::LicensePolicy;
    use crate::signal::Signal;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct NoopAtom;

    #[async_trait]
    impl crate::atom::Atom for NoopAtom {
        async fn run(&self, _ctx: &RunContext, _inputs: &[Signal]) -> CoreResult<Vec<Signal>> {
            Ok(vec![])
        }
    }

    fn register(registry: &mut AtomRegistry, name: &str, reads: &[&str], writes: &[&str]) {
        registry
            .register(
                AtomContract {
                    name: name.to_string(),
                    kind: AtomKind::Extractor,
                    deterministic: true,
                    persistent: false,
                    reads: reads.iter().map(|s| s.to_string()).collect(),
                    writes: writes.iter().map(|s| s.to_string()).collect(),
                    license: LicensePolicy::default(),
                    lane: Lane::Io,
                },
                Arc::new(NoopAtom),
            )
            .unwrap();
    }

    #[test]
    fn canonical_keys_deserialize() {
        let json = r#"{
            "id": "wf-1",
            "nodes": [{"id": "n1", "atomName": "a.sensor"}],
            "edges": [{"source": "n1", "signal": "s", "target": "n1", "allow_self_edge": true}]
        }"#;
        let def = WorkflowDefinition::parse(json).unwrap();
        assert_eq!(def.nodes[0].atom_name, "a.sensor");
        assert_eq!(def.edges[0].source_node, "n1");
        assert_eq!(def.edges[0].signal_name, "s");
    }

    #[test]
    fn aliases_deserialize() {
        let json = r#"{
            "id": "wf-1",
            "nodes": [{"id": "n1", "manifestName": "a.sensor"}],
            "edges": [{"sourceNodeId": "n1", "signalKey": "s", "targetNodeId": "n1", "allow_self_edge": true}]
        }"#;
        let def = WorkflowDefinition::parse(json).unwrap();
        assert_eq!(def.nodes[0].atom_name, "a.sensor");
        assert_eq!(def.edges[0].source_node, "n1");
        assert_eq!(def.edges[0].signal_name, "s");
    }

    #[test]
    fn snake_case_keys_still_deserialize() {
        let json = r#"{
            "id": "wf-1",
            "nodes": [{"id": "n1", "atom_name": "a.sensor"}],
            "edges": [{"source_node": "n1", "signal_name": "s", "target_node": "n1", "allow_self_edge": true}]
        }"#;
        let def = WorkflowDefinition::parse(json).unwrap();
        assert_eq!(def.nodes[0].atom_name, "a.sensor");
        assert_eq!(def.edges[0].source_node, "n1");
        assert_eq!(def.edges[0].signal_name, "s");
    }

    #[test]
    fn rejects_edge_to_unwritten_signal() {
        let mut registry = AtomRegistry::new();
        register(&mut registry, "a", &["*"], &["out.a"]);
        register(&mut registry, "b", &["*"], &["out.b"]);

        let def = WorkflowDefinition {
            id: "wf".into(),
            nodes: vec![
                WorkflowNode { id: "n1".into(), atom_name: "a".into(), config: serde_json::Value::Null, trigger_mode: TriggerMode::Any },
                WorkflowNode { id: "n2".into(), atom_name: "b".into(), config: serde_json::Value::Null, trigger_mode: TriggerMode::Any },
            ],
            edges: vec![WorkflowEdge {
                source_node: "n1".into(),
                signal_name: "not.written".into(),
                target_node: "n2".into(),
                allow_self_edge: false,
            }],
        };
        assert!(def.compile(&registry).is_err());
    }

    #[test]
    fn rejects_unallowed_self_edge() {
        let mut registry = AtomRegistry::new();
        register(&mut registry, "a", &["*"], &["out.a"]);
        let def = WorkflowDefinition {
            id: "wf".into(),
            nodes: vec![WorkflowNode { id: "n1".into(), atom_name: "a".into(), config: serde_json::Value::Null, trigger_mode: TriggerMode::Any }],
            edges: vec![WorkflowEdge {
                source_node: "n1".into(),
                signal_name: "out.a".into(),
                target_node: "n1".into(),
                allow_self_edge: false,
            }],
        };
        assert!(def.compile(&registry).is_err());
    }

    #[test]
    fn dedups_identical_edges() {
        let mut registry = AtomRegistry::new();
        register(&mut registry, "a", &["*"], &["out.a"]);
        register(&mut registry, "b", &["*"], &["out.b"]);
        let edge = WorkflowEdge {
            source_node: "n1".into(),
            signal_name: "out.a".into(),
            target_node: "n2".into(),
            allow_self_edge: false,
        };
        let def = WorkflowDefinition {
            id: "wf".into(),
            nodes: vec![
                WorkflowNode { id: "n1".into(), atom_name: "a".into(), config: serde_json::Value::Null, trigger_mode: TriggerMode::Any },
                WorkflowNode { id: "n2".into(), atom_name: "b".into(), config: serde_json::Value::Null, trigger_mode: TriggerMode::Any },
            ],
            edges: vec![edge.clone(), edge],
        };
        let compiled = def.compile(&registry).unwrap();
        assert_eq!(compiled.definition.edges.len(), 1);
    }

    #[test]
    fn detects_cycle() {
        let mut registry = AtomRegistry::new();
        register(&mut registry, "a", &["*"], &["s.a"]);
        register(&mut registry, "b", &["*"], &["s.b"]);
        let def = WorkflowDefinition {
            id: "wf".into(),
            nodes: vec![
                WorkflowNode { id: "n1".into(), atom_name: "a".into(), config: serde_json::Value::Null, trigger_mode: TriggerMode::Any },
                WorkflowNode { id: "n2".into(), atom_name: "b".into(), config: serde_json::Value::Null, trigger_mode: TriggerMode::Any },
            ],
            edges: vec![
                WorkflowEdge { source_node: "n1".into(), signal_name: "s.a".into(), target_node: "n2".into(), allow_self_edge: false },
                WorkflowEdge { source_node: "n2".into(), signal_name: "s.b".into(), target_node: "n1".into(), allow_self_edge: false },
            ],
        };
        let compiled = def.compile(&registry).unwrap();
        assert!(!compiled.cycle_edges.is_empty());
    }
}
