//! Node graph
//!
//! Nodes name their upstream nodes in `inputs`; links run from input to
//! consumer. The graph may be edited freely, including into a cycle; cycles are
//! only rejected when the graph is split into networks for code generation.

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::unionfind::UnionFind;
use petgraph::visit::{EdgeRef, IntoEdgeReferences, NodeIndexable};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use crate::core::errors::{EngineError, Result};

/// A node in the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub id: String,
    /// Name of the registered action
    pub action: String,
    /// Upstream node ids, in argument order
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub description: String,
}

impl NodeDefinition {
    pub fn new(id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            action: action.into(),
            inputs: Vec::new(),
            params: Value::Null,
            description: String::new(),
        }
    }

    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }
}

/// Ids and action names end up as script identifiers, so they are limited to
/// ASCII letters, digits, `_`, `-` and `.`
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn check_names(node: &NodeDefinition) -> Result<()> {
    if !is_valid_name(&node.id) {
        return Err(EngineError::graph(format!("invalid node id `{}`", node.id)));
    }
    if !is_valid_name(&node.action) {
        return Err(EngineError::graph(format!(
            "node `{}` has invalid action name `{}`",
            node.id, node.action
        )));
    }
    Ok(())
}

/// Serialized form of a graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub nodes: Vec<NodeDefinition>,
}

#[derive(Debug, Clone)]
pub struct NodeGraph {
    pub name: String,
    graph: StableDiGraph<NodeDefinition, ()>,
    indices: HashMap<String, NodeIndex>,
    /// Declaration order; decides network and statement order
    order: Vec<NodeIndex>,
}

impl NodeGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            graph: StableDiGraph::new(),
            indices: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Nodes may list inputs declared later in the file
    pub fn from_definition(definition: GraphDefinition) -> Result<Self> {
        let mut graph = Self::new(definition.name);
        for node in &definition.nodes {
            check_names(node)?;
            if graph.indices.contains_key(&node.id) {
                return Err(EngineError::graph(format!("duplicate node id `{}`", node.id)));
            }
            let index = graph.graph.add_node(node.clone());
            graph.indices.insert(node.id.clone(), index);
            graph.order.push(index);
        }
        for node in &definition.nodes {
            graph.link_inputs(&node.id, &node.inputs)?;
        }
        Ok(graph)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let definition: GraphDefinition = serde_yaml::from_str(yaml)?;
        Self::from_definition(definition)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::io(format!("read graph {}", path.display()), e))?;
        Self::from_yaml_str(&content)
    }

    pub fn to_definition(&self) -> GraphDefinition {
        GraphDefinition {
            name: self.name.clone(),
            description: String::new(),
            nodes: self.order.iter().map(|&i| self.graph[i].clone()).collect(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.order.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.indices.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&NodeDefinition> {
        self.indices.get(id).map(|&i| &self.graph[i])
    }

    /// Add a node whose inputs already exist
    pub fn add_node(&mut self, node: NodeDefinition) -> Result<()> {
        check_names(&node)?;
        if self.contains(&node.id) {
            return Err(EngineError::graph(format!("duplicate node id `{}`", node.id)));
        }
        if let Some(missing) = node.inputs.iter().find(|id| !self.contains(id)) {
            return Err(EngineError::graph(format!(
                "node `{}` references unknown input `{}`",
                node.id, missing
            )));
        }
        let id = node.id.clone();
        let inputs = node.inputs.clone();
        let index = self.graph.add_node(node);
        self.indices.insert(id.clone(), index);
        self.order.push(index);
        self.link_inputs(&id, &inputs)
    }

    /// Remove a node and every link touching it
    pub fn remove_node(&mut self, id: &str) -> Result<NodeDefinition> {
        let index = self
            .indices
            .remove(id)
            .ok_or_else(|| EngineError::graph(format!("unknown node `{}`", id)))?;
        self.order.retain(|&i| i != index);

        let consumers: Vec<NodeIndex> = self
            .graph
            .edges_directed(index, Direction::Outgoing)
            .map(|edge| edge.target())
            .collect();
        for consumer in consumers {
            self.graph[consumer].inputs.retain(|input| input != id);
        }

        self.graph
            .remove_node(index)
            .ok_or_else(|| EngineError::graph(format!("unknown node `{}`", id)))
    }

    /// Replace a node's params; not a topology change
    pub fn set_params(&mut self, id: &str, params: Value) -> Result<Value> {
        let index = self.index_of(id)?;
        Ok(std::mem::replace(&mut self.graph[index].params, params))
    }

    /// Feed the output of `from` into `to` as its last input
    pub fn connect(&mut self, from: &str, to: &str) -> Result<()> {
        let source = self.index_of(from)?;
        let target = self.index_of(to)?;
        self.graph[target].inputs.push(from.to_string());
        self.graph.add_edge(source, target, ());
        Ok(())
    }

    fn index_of(&self, id: &str) -> Result<NodeIndex> {
        self.indices
            .get(id)
            .copied()
            .ok_or_else(|| EngineError::graph(format!("unknown node `{}`", id)))
    }

    fn link_inputs(&mut self, id: &str, inputs: &[String]) -> Result<()> {
        let target = self.index_of(id)?;
        for input in inputs {
            let source = self.indices.get(input).copied().ok_or_else(|| {
                EngineError::graph(format!("node `{}` references unknown input `{}`", id, input))
            })?;
            self.graph.add_edge(source, target, ());
        }
        Ok(())
    }

    /// Split the graph into independent networks.
    ///
    /// Networks are ordered by their first declared node; nodes within a
    /// network are in dependency order, ties broken by declaration order.
    pub fn independent_networks(&self) -> Result<Vec<Vec<NodeDefinition>>> {
        let sorted = self.sorted()?;

        let mut components = UnionFind::<usize>::new(self.graph.node_bound());
        for edge in self.graph.edge_references() {
            components.union(edge.source().index(), edge.target().index());
        }

        let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
        for &index in &self.order {
            let root = components.find(index.index());
            let next = slot_of_root.len();
            slot_of_root.entry(root).or_insert(next);
        }

        let mut networks = vec![Vec::new(); slot_of_root.len()];
        for index in sorted {
            let slot = slot_of_root[&components.find(index.index())];
            networks[slot].push(self.graph[index].clone());
        }
        Ok(networks)
    }

    /// Kahn's algorithm, always taking the earliest declared ready node
    fn sorted(&self) -> Result<Vec<NodeIndex>> {
        let mut pending: HashMap<NodeIndex, usize> = self
            .order
            .iter()
            .map(|&i| (i, self.graph.edges_directed(i, Direction::Incoming).count()))
            .collect();
        let mut sorted = Vec::with_capacity(self.order.len());

        while sorted.len() < self.order.len() {
            let next = self
                .order
                .iter()
                .copied()
                .find(|i| pending.get(i) == Some(&0))
                .ok_or_else(|| {
                    let stuck: Vec<&str> = self
                        .order
                        .iter()
                        .filter(|i| pending.contains_key(*i))
                        .map(|&i| self.graph[i].id.as_str())
                        .collect();
                    EngineError::graph(format!("cycle between nodes {}", stuck.join(", ")))
                })?;

            pending.remove(&next);
            for edge in self.graph.edges_directed(next, Direction::Outgoing) {
                if let Some(count) = pending.get_mut(&edge.target()) {
                    *count -= 1;
                }
            }
            sorted.push(next);
        }
        Ok(sorted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const TWO_NETWORKS: &str = r#"
name: demo
nodes:
  - id: total
    action: sum
    inputs: [a, b]
  - id: a
    action: constant
    params: { value: 1 }
  - id: b
    action: constant
    params: { value: 2 }
  - id: lonely
    action: constant
    params: { value: 9 }
"#;

    fn ids(network: &[NodeDefinition]) -> Vec<&str> {
        network.iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn test_networks_are_split_and_sorted() {
        let graph = NodeGraph::from_yaml_str(TWO_NETWORKS).unwrap();
        let networks = graph.independent_networks().unwrap();
        assert_eq!(networks.len(), 2);
        assert_eq!(ids(&networks[0]), vec!["a", "b", "total"]);
        assert_eq!(ids(&networks[1]), vec!["lonely"]);
    }

    #[test]
    fn test_empty_graph_has_no_networks() {
        let graph = NodeGraph::new("empty");
        assert!(graph.independent_networks().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_input_and_duplicates_rejected() {
        let mut graph = NodeGraph::new("g");
        graph.add_node(NodeDefinition::new("a", "constant")).unwrap();
        assert!(graph.add_node(NodeDefinition::new("a", "constant")).is_err());
        let err = graph
            .add_node(NodeDefinition::new("b", "sum").with_inputs(["missing"]))
            .unwrap_err();
        assert!(err.to_string().contains("unknown input `missing`"));
    }

    #[test]
    fn test_names_must_be_script_identifiers() {
        let mut graph = NodeGraph::new("g");
        for id in ["#p", "my node", "a=b", "f(x)", "a,b", ""] {
            let err = graph.add_node(NodeDefinition::new(id, "constant")).unwrap_err();
            assert_eq!(err.category(), "graph");
            assert!(err.to_string().contains("invalid node id"), "{}", id);
        }
        let err = graph.add_node(NodeDefinition::new("x", "sum(x)")).unwrap_err();
        assert!(err.to_string().contains("invalid action name `sum(x)`"));
        graph
            .add_node(NodeDefinition::new("node_1.out-2", "constant"))
            .unwrap();
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_yaml_with_invalid_id_rejected() {
        let yaml = "name: g\nnodes:\n  - id: \"#hidden\"\n    action: constant\n";
        let err = NodeGraph::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("invalid node id `#hidden`"));
    }

    #[test]
    fn test_cycle_detected_at_split_time() {
        let mut graph = NodeGraph::new("g");
        graph.add_node(NodeDefinition::new("a", "echo")).unwrap();
        graph
            .add_node(NodeDefinition::new("b", "echo").with_inputs(["a"]))
            .unwrap();
        graph.connect("b", "a").unwrap();

        let err = graph.independent_networks().unwrap_err();
        assert!(err.to_string().contains("cycle between nodes a, b"));
    }

    #[test]
    fn test_remove_node_unlinks_consumers() {
        let mut graph = NodeGraph::from_yaml_str(TWO_NETWORKS).unwrap();
        graph.remove_node("b").unwrap();
        assert_eq!(graph.node("total").unwrap().inputs, vec!["a".to_string()]);
        assert_eq!(graph.node_count(), 3);

        graph.remove_node("a").unwrap();
        let networks = graph.independent_networks().unwrap();
        // `total` is now on its own
        assert_eq!(networks.len(), 2);
        assert_eq!(ids(&networks[0]), vec!["total"]);
    }

    #[test]
    fn test_connect_merges_networks() {
        let mut graph = NodeGraph::from_yaml_str(TWO_NETWORKS).unwrap();
        graph.connect("lonely", "total").unwrap();
        let networks = graph.independent_networks().unwrap();
        assert_eq!(networks.len(), 1);
        assert_eq!(ids(&networks[0]), vec!["a", "b", "lonely", "total"]);
    }

    #[test]
    fn test_set_params_keeps_networks() {
        let mut graph = NodeGraph::from_yaml_str(TWO_NETWORKS).unwrap();
        let old = graph.set_params("a", json!({"value": 10})).unwrap();
        assert_eq!(old, json!({"value": 1}));
        assert_eq!(graph.node("a").unwrap().params, json!({"value": 10}));
        assert!(graph.set_params("nope", json!(null)).is_err());
        assert_eq!(graph.independent_networks().unwrap().len(), 2);
    }

    #[test]
    fn test_definition_round_trip_keeps_order() {
        let graph = NodeGraph::from_yaml_str(TWO_NETWORKS).unwrap();
        let def = graph.to_definition();
        assert_eq!(def.nodes[0].id, "total");
        assert_eq!(def.nodes[1].params, json!({"value": 1}));
    }
}
