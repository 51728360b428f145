//! Turns the node graph into one script per independent network.
//!
//! Script format, one statement per line:
//!
//! ```text
//! # network 0
//! a = constant() {"value":1}
//! total = sum(a, b)
//! ```

use parking_lot::RwLock;
use std::sync::Arc;

use super::graph::{NodeDefinition, NodeGraph};
use crate::program::{CodeGenerator, SourceProgram};

pub struct NetworkCodeGenerator {
    graph: Arc<RwLock<NodeGraph>>,
}

impl NetworkCodeGenerator {
    /// The graph is shared with whoever edits it
    pub fn new(graph: Arc<RwLock<NodeGraph>>) -> Self {
        Self { graph }
    }
}

impl CodeGenerator for NetworkCodeGenerator {
    fn generate(&self) -> anyhow::Result<Vec<SourceProgram>> {
        let networks = self.graph.read().independent_networks()?;
        Ok(networks
            .iter()
            .enumerate()
            .map(|(index, nodes)| SourceProgram::new(index, network_source(index, nodes)))
            .collect())
    }
}

fn network_source(index: usize, nodes: &[NodeDefinition]) -> String {
    let mut lines = Vec::with_capacity(nodes.len() + 1);
    lines.push(format!("# network {}", index));
    for node in nodes {
        lines.push(statement(node));
    }
    lines.join("\n")
}

fn statement(node: &NodeDefinition) -> String {
    let call = format!("{} = {}({})", node.id, node.action, node.inputs.join(", "));
    let has_params = match &node.params {
        serde_json::Value::Null => false,
        serde_json::Value::Object(map) => !map.is_empty(),
        _ => true,
    };
    if has_params {
        format!("{} {}", call, node.params)
    } else {
        call
    }
}
