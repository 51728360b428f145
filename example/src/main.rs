use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use dagger_live::network::{ActionRegistry, NodeAction, NodeCtx, NodeDefinition, NodeGraph, OUTPUT_KEY};
use dagger_live::{network_coordinator, EngineConfig, LoggingDiagnostics, Trigger, UpdateOutcome};

// Example NodeAction implementation
struct SquareAction;

#[async_trait]
impl NodeAction for SquareAction {
    fn name(&self) -> &str {
        "square"
    }

    async fn execute(&self, ctx: &NodeCtx) -> Result<Value> {
        let num = ctx
            .input(0)?
            .as_f64()
            .ok_or_else(|| anyhow!("Failed to get input for squaring"))?;
        Ok(json!(num * num))
    }
}

fn describe(outcome: &UpdateOutcome) {
    match outcome {
        UpdateOutcome::Completed(report) => info!(
            "update done: {:?}, {} executed, {} failed, {} recovered",
            report.rebuild,
            report.executed,
            report.failed.len(),
            report.recovered.len()
        ),
        other => info!("update not run: {:?}", other),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let graph = NodeGraph::from_yaml_file(format!("{}/graph.yaml", manifest_dir))?;
    let config = EngineConfig::from_yaml_file(format!("{}/config.yaml", manifest_dir))?;

    let registry = ActionRegistry::with_builtins();
    registry.register(Arc::new(SquareAction));

    let graph = Arc::new(RwLock::new(graph));
    let coordinator = network_coordinator(graph.clone(), registry)
        .with_config(config)?
        .with_diagnostics(Arc::new(LoggingDiagnostics));

    // File load builds everything
    describe(&coordinator.handle_trigger(Trigger::FileLoad).await?);
    println!("{}", coordinator.render_sources());

    // A few frames reuse the compiled programs
    for _ in 0..3 {
        describe(&coordinator.handle_trigger(Trigger::FrameChange).await?);
    }

    // Disabled in config.yaml
    describe(&coordinator.handle_trigger(Trigger::SceneUpdate).await?);

    // Topology edit forces a rebuild
    graph.write().add_node(
        NodeDefinition::new("double", "sum").with_inputs(["squared", "squared"]),
    )?;
    describe(&coordinator.handle_trigger(Trigger::TreeChanged).await?);
    info!(
        "cache after update holds {} values (\"{}\" entries are wiped per update)",
        coordinator.cache().len(),
        OUTPUT_KEY
    );

    let stats = coordinator.stats();
    info!(
        "{} updates, {} rebuilds, avg {:?}",
        stats.updates,
        stats.rebuilds,
        stats.avg_update_time()
    );

    Ok(())
}
