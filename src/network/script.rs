//! Compiler and runtime for network scripts

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use super::action::{NodeAction, NodeCtx};
use super::graph::{is_valid_name, NodeGraph};
use super::registry::ActionRegistry;
use crate::program::{Executable, ProgramCompiler, RunContext, SourceProgram};

/// Cache key under which every node's output is memoized
pub const OUTPUT_KEY: &str = "output";

/// Compiles scripts against the actions of a registry
#[derive(Clone)]
pub struct ScriptCompiler {
    registry: ActionRegistry,
    live_params: Option<Arc<RwLock<NodeGraph>>>,
}

impl ScriptCompiler {
    pub fn new(registry: ActionRegistry) -> Self {
        Self {
            registry,
            live_params: None,
        }
    }

    /// Read params from `graph` on every run instead of the compiled text, so
    /// property edits apply without a rebuild
    pub fn with_live_params(mut self, graph: Arc<RwLock<NodeGraph>>) -> Self {
        self.live_params = Some(graph);
        self
    }

    /// Parse and resolve a script without wrapping it as an artifact
    pub fn compile_script(&self, source: &SourceProgram) -> anyhow::Result<CompiledScript> {
        let mut steps = Vec::new();
        let mut defined: HashSet<String> = HashSet::new();

        for (line_no, line) in source.text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let statement = parse_statement(line).with_context(|| format!("line {}", line_no + 1))?;

            if defined.contains(&statement.node_id) {
                bail!("line {}: `{}` is defined twice", line_no + 1, statement.node_id);
            }
            if let Some(unknown) = statement.inputs.iter().find(|i| !defined.contains(*i)) {
                bail!("line {}: `{}` is used before it is defined", line_no + 1, unknown);
            }
            let action = self
                .registry
                .get(&statement.action)
                .ok_or_else(|| anyhow!("line {}: unknown action `{}`", line_no + 1, statement.action))?;
            action
                .validate_params(&statement.params)
                .with_context(|| format!("line {}: invalid params for `{}`", line_no + 1, statement.node_id))?;

            defined.insert(statement.node_id.clone());
            steps.push(Step {
                node_id: statement.node_id,
                action,
                inputs: statement.inputs,
                params: statement.params,
            });
        }

        Ok(CompiledScript {
            steps,
            live_params: self.live_params.clone(),
        })
    }
}

impl ProgramCompiler for ScriptCompiler {
    fn compile(&self, source: &SourceProgram) -> anyhow::Result<Arc<dyn Executable>> {
        Ok(Arc::new(self.compile_script(source)?))
    }
}

#[derive(Debug, PartialEq)]
struct Statement {
    node_id: String,
    action: String,
    inputs: Vec<String>,
    params: Value,
}

/// `<id> = <action>(<input>, ...) [<json params>]`
fn parse_statement(line: &str) -> anyhow::Result<Statement> {
    let (node_id, call) = line
        .split_once('=')
        .ok_or_else(|| anyhow!("expected `<id> = <action>(...)`"))?;
    let node_id = node_id.trim();
    if !is_valid_name(node_id) {
        bail!("invalid node id `{}`", node_id);
    }

    let call = call.trim();
    let open = call.find('(').ok_or_else(|| anyhow!("missing `(` after action"))?;
    let close = call[open..]
        .find(')')
        .map(|offset| open + offset)
        .ok_or_else(|| anyhow!("missing `)`"))?;

    let action = call[..open].trim();
    if action.is_empty() {
        bail!("missing action name");
    }
    if !is_valid_name(action) {
        bail!("invalid action name `{}`", action);
    }
    let inputs = call[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    let rest = call[close + 1..].trim();
    let params = if rest.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(rest).context("params are not valid JSON")?
    };

    Ok(Statement {
        node_id: node_id.to_string(),
        action: action.to_string(),
        inputs,
        params,
    })
}

struct Step {
    node_id: String,
    action: Arc<dyn NodeAction>,
    inputs: Vec<String>,
    params: Value,
}

/// A resolved script, ready to run
pub struct CompiledScript {
    steps: Vec<Step>,
    live_params: Option<Arc<RwLock<NodeGraph>>>,
}

impl CompiledScript {
    pub fn node_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.node_id.as_str()).collect()
    }

    fn params_for(&self, step: &Step) -> Value {
        // a node deleted since compilation keeps its compiled params
        self.live_params
            .as_ref()
            .and_then(|graph| graph.read().node(&step.node_id).map(|n| n.params.clone()))
            .unwrap_or_else(|| step.params.clone())
    }
}

#[async_trait]
impl Executable for CompiledScript {
    async fn run(&self, ctx: &RunContext) -> anyhow::Result<()> {
        for step in &self.steps {
            // already computed earlier in this update
            if let Some(value) = ctx.cache.get_value(&step.node_id, OUTPUT_KEY) {
                ctx.set_local(step.node_id.clone(), value);
                continue;
            }

            let inputs = step
                .inputs
                .iter()
                .map(|id| {
                    ctx.local(id)
                        .ok_or_else(|| anyhow!("input `{}` of `{}` has no value", id, step.node_id))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;

            let mut node_ctx = NodeCtx::new(
                step.node_id.clone(),
                inputs,
                self.params_for(step),
                ctx.cache.clone(),
            );
            node_ctx.profiling = ctx.profiling;

            let started = Instant::now();
            let value = step
                .action
                .execute(&node_ctx)
                .await
                .with_context(|| format!("node `{}` ({}) failed", step.node_id, step.action.name()))?;
            if ctx.profiling {
                tracing::debug!(
                    node = %step.node_id,
                    action = step.action.name(),
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "node executed"
                );
            }

            ctx.cache.insert_value(&step.node_id, OUTPUT_KEY, &value)?;
            ctx.set_local(step.node_id.clone(), value);
        }
        Ok(())
    }
}
