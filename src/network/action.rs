//! Node actions - what a single node computes
//!
//! Actions are pure computation: read inputs and params, return one output
//! value. Memoization and ordering are handled by the compiled script.

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use serde_json::Value;

use crate::cache::ExecutionCache;

/// Context for one node evaluation
#[derive(Clone)]
pub struct NodeCtx {
    pub node_id: String,
    /// Outputs of the upstream nodes, in declaration order
    pub inputs: Vec<Value>,
    pub params: Value,
    pub cache: ExecutionCache,
    pub profiling: bool,
}

impl NodeCtx {
    pub fn new(node_id: impl Into<String>, inputs: Vec<Value>, params: Value, cache: ExecutionCache) -> Self {
        Self {
            node_id: node_id.into(),
            inputs,
            params,
            cache,
            profiling: false,
        }
    }

    pub fn input(&self, position: usize) -> anyhow::Result<&Value> {
        self.inputs
            .get(position)
            .ok_or_else(|| anyhow!("node `{}` has no input #{}", self.node_id, position))
    }

    pub fn get_param<T: serde::de::DeserializeOwned>(&self, key: &str) -> anyhow::Result<T> {
        let value = self
            .params
            .get(key)
            .ok_or_else(|| anyhow!("Param '{}' not found", key))?;
        serde_json::from_value(value.clone())
            .with_context(|| format!("Failed to deserialize param '{}'", key))
    }
}

#[async_trait]
pub trait NodeAction: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, ctx: &NodeCtx) -> anyhow::Result<Value>;

    /// Checked once at compile time
    fn validate_params(&self, _params: &Value) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Emits `params.value`
pub struct ConstantAction;

#[async_trait]
impl NodeAction for ConstantAction {
    fn name(&self) -> &str {
        "constant"
    }

    async fn execute(&self, ctx: &NodeCtx) -> anyhow::Result<Value> {
        ctx.get_param("value")
    }

    fn validate_params(&self, params: &Value) -> anyhow::Result<()> {
        if params.get("value").is_none() {
            bail!("constant needs a `value` param");
        }
        Ok(())
    }
}

/// Adds up numeric inputs
pub struct SumAction;

#[async_trait]
impl NodeAction for SumAction {
    fn name(&self) -> &str {
        "sum"
    }

    async fn execute(&self, ctx: &NodeCtx) -> anyhow::Result<Value> {
        let mut total = 0.0;
        for (position, input) in ctx.inputs.iter().enumerate() {
            total += input
                .as_f64()
                .ok_or_else(|| anyhow!("input #{} of `{}` is not a number: {}", position, ctx.node_id, input))?;
        }
        Ok(serde_json::json!(total))
    }
}

/// Passes its single input through, or all of them as an array
pub struct EchoAction;

#[async_trait]
impl NodeAction for EchoAction {
    fn name(&self) -> &str {
        "echo"
    }

    async fn execute(&self, ctx: &NodeCtx) -> anyhow::Result<Value> {
        tracing::debug!("Echo action: {} with inputs: {:?}", ctx.node_id, ctx.inputs);
        Ok(match ctx.inputs.as_slice() {
            [single] => single.clone(),
            many => Value::Array(many.to_vec()),
        })
    }
}
