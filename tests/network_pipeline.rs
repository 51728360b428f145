//! Node graph → scripts → coordinator, end to end

use async_trait::async_trait;
use dagger_live::network::{ActionRegistry, NodeAction, NodeCtx, NodeDefinition, NodeGraph};
use dagger_live::{
    network_coordinator, BufferingDiagnostics, DiagnosticEvent, EngineConfig, EngineError,
    RebuildStatus, Trigger,
};
use parking_lot::{Mutex, RwLock};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const GRAPH: &str = r#"
name: pipeline
nodes:
  - id: a
    action: constant
    params: { value: 2 }
  - id: b
    action: constant
    params: { value: 5 }
  - id: total
    action: sum
    inputs: [a, b]
  - id: seen_total
    action: record
    inputs: [total]
  - id: greeting
    action: constant
    params: { value: "hi" }
  - id: seen_greeting
    action: record
    inputs: [greeting]
"#;

/// Records what reaches it, keyed by node id
#[derive(Default)]
struct RecordAction {
    seen: Mutex<Vec<(String, Value)>>,
}

#[async_trait]
impl NodeAction for RecordAction {
    fn name(&self) -> &str {
        "record"
    }

    async fn execute(&self, ctx: &NodeCtx) -> anyhow::Result<Value> {
        let input = ctx.input(0)?.clone();
        self.seen.lock().push((ctx.node_id.clone(), input.clone()));
        Ok(input)
    }
}

/// Fails until it has been called `failures` times
struct StutterAction {
    calls: AtomicUsize,
    failures: usize,
}

#[async_trait]
impl NodeAction for StutterAction {
    fn name(&self) -> &str {
        "stutter"
    }

    async fn execute(&self, ctx: &NodeCtx) -> anyhow::Result<Value> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            anyhow::bail!("stutter in {}", ctx.node_id);
        }
        Ok(json!("steady"))
    }
}

/// Panics on its first call only
#[derive(Default)]
struct PanicOnceAction {
    fired: AtomicUsize,
}

#[async_trait]
impl NodeAction for PanicOnceAction {
    fn name(&self) -> &str {
        "panic_once"
    }

    async fn execute(&self, _ctx: &NodeCtx) -> anyhow::Result<Value> {
        if self.fired.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("first call");
        }
        Ok(Value::Null)
    }
}

struct Fixture {
    graph: Arc<RwLock<NodeGraph>>,
    recorder: Arc<RecordAction>,
    registry: ActionRegistry,
}

fn fixture() -> Fixture {
    let graph = Arc::new(RwLock::new(NodeGraph::from_yaml_str(GRAPH).unwrap()));
    let recorder = Arc::new(RecordAction::default());
    let registry = ActionRegistry::with_builtins();
    registry.register(recorder.clone());
    Fixture {
        graph,
        recorder,
        registry,
    }
}

impl Fixture {
    fn take_seen(&self) -> Vec<(String, Value)> {
        std::mem::take(&mut *self.recorder.seen.lock())
    }
}

#[tokio::test]
async fn test_file_load_builds_one_program_per_network() {
    let fx = fixture();
    let coordinator = network_coordinator(fx.graph.clone(), fx.registry.clone());

    let outcome = coordinator.handle_trigger(Trigger::FileLoad).await.unwrap();
    let report = outcome.report().unwrap();
    assert_eq!(report.rebuild, RebuildStatus::Rebuilt { artifacts: 2 });
    assert!(report.is_clean());

    assert_eq!(
        fx.take_seen(),
        vec![
            ("seen_total".to_string(), json!(7.0)),
            ("seen_greeting".to_string(), json!("hi")),
        ]
    );
    assert_eq!(
        coordinator.sources()[1].text,
        "# network 1\ngreeting = constant() {\"value\":\"hi\"}\nseen_greeting = record(greeting)"
    );
    // outputs only live for the duration of an update
    assert!(coordinator.cache().is_empty());
}

#[tokio::test]
async fn test_property_edit_applies_without_rebuild() {
    let fx = fixture();
    let coordinator = network_coordinator(fx.graph.clone(), fx.registry.clone());
    coordinator.handle_trigger(Trigger::FileLoad).await.unwrap();
    fx.take_seen();

    fx.graph.write().set_params("a", json!({"value": 10})).unwrap();
    let outcome = coordinator.handle_trigger(Trigger::PropertyChange).await.unwrap();

    assert_eq!(outcome.report().unwrap().rebuild, RebuildStatus::NotRequested);
    assert_eq!(coordinator.store_generation(), 1);
    assert_eq!(fx.take_seen()[0], ("seen_total".to_string(), json!(15.0)));
}

#[tokio::test]
async fn test_topology_edit_needs_rebuild() {
    let fx = fixture();
    let coordinator = network_coordinator(fx.graph.clone(), fx.registry.clone());
    coordinator.handle_trigger(Trigger::FileLoad).await.unwrap();

    // joining the two networks into one
    fx.graph.write().connect("greeting", "seen_total").unwrap();
    fx.graph
        .write()
        .add_node(NodeDefinition::new("c", "constant").with_params(json!({"value": 1})))
        .unwrap();

    // a tick still runs the old two programs
    coordinator.handle_trigger(Trigger::FrameChange).await.unwrap();
    assert_eq!(coordinator.artifact_count(), 2);

    let outcome = coordinator.handle_trigger(Trigger::TreeChanged).await.unwrap();
    assert_eq!(
        outcome.report().unwrap().rebuild,
        RebuildStatus::Rebuilt { artifacts: 2 }
    );
    assert!(coordinator.sources()[1].text.ends_with("c = constant() {\"value\":1}"));
}

#[tokio::test]
async fn test_unknown_action_keeps_previous_programs() {
    let fx = fixture();
    let sink = Arc::new(BufferingDiagnostics::new());
    let coordinator = network_coordinator(fx.graph.clone(), fx.registry.clone())
        .with_diagnostics(sink.clone());
    coordinator.handle_trigger(Trigger::FileLoad).await.unwrap();
    fx.take_seen();

    fx.graph
        .write()
        .add_node(NodeDefinition::new("mystery", "teleport"))
        .unwrap();
    let outcome = coordinator.handle_trigger(Trigger::TreeChanged).await.unwrap();

    assert_eq!(outcome.report().unwrap().rebuild, RebuildStatus::Abandoned);
    assert_eq!(coordinator.artifact_count(), 2);
    assert_eq!(fx.take_seen().len(), 2);
    let abandoned = sink.events().into_iter().find_map(|e| match e {
        DiagnosticEvent::RebuildAbandoned { category, message } => Some((category, message)),
        _ => None,
    });
    let (category, message) = abandoned.unwrap();
    assert_eq!(category, "compilation");
    assert!(message.contains("unknown action `teleport`"));
}

#[tokio::test]
async fn test_cycle_is_a_generation_failure() {
    let fx = fixture();
    let coordinator = network_coordinator(fx.graph.clone(), fx.registry.clone());
    coordinator.handle_trigger(Trigger::FileLoad).await.unwrap();

    fx.graph.write().connect("seen_total", "a").unwrap();
    let outcome = coordinator.handle_trigger(Trigger::TreeChanged).await.unwrap();
    assert_eq!(outcome.report().unwrap().rebuild, RebuildStatus::Abandoned);
    assert_eq!(coordinator.store_generation(), 1);
}

#[tokio::test]
async fn test_runtime_failure_recovers_through_rebuild() {
    let fx = fixture();
    fx.registry.register(Arc::new(StutterAction {
        calls: AtomicUsize::new(0),
        failures: 1,
    }));
    fx.graph
        .write()
        .add_node(NodeDefinition::new("wobble", "stutter"))
        .unwrap();
    let coordinator = network_coordinator(fx.graph.clone(), fx.registry.clone());

    let outcome = coordinator.handle_trigger(Trigger::FileLoad).await.unwrap();
    let report = outcome.report().unwrap();
    assert_eq!(report.recovered, vec![2]);
    assert_eq!(report.executed, 3);
}

#[tokio::test]
async fn test_runtime_failure_surfaces_in_strict_mode() {
    let fx = fixture();
    fx.registry.register(Arc::new(StutterAction {
        calls: AtomicUsize::new(0),
        failures: usize::MAX,
    }));
    fx.graph
        .write()
        .add_node(NodeDefinition::new("wobble", "stutter"))
        .unwrap();
    let coordinator = network_coordinator(fx.graph.clone(), fx.registry.clone())
        .with_config(EngineConfig {
            show_full_error: true,
            ..Default::default()
        })
        .unwrap();

    let err = coordinator.handle_trigger(Trigger::FileLoad).await.unwrap_err();
    match err {
        EngineError::Runtime { index, message, .. } => {
            assert_eq!(index, 2);
            assert!(message.contains("node `wobble` (stutter) failed"));
            assert!(message.contains("stutter in wobble"));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(!coordinator.is_update_in_flight());
}

#[tokio::test]
async fn test_panic_leaves_no_stale_outputs() {
    let fx = fixture();
    fx.registry.register(Arc::new(PanicOnceAction::default()));
    fx.graph
        .write()
        .add_node(NodeDefinition::new("boom", "panic_once"))
        .unwrap();
    let coordinator = Arc::new(network_coordinator(fx.graph.clone(), fx.registry.clone()));

    let first = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.handle_trigger(Trigger::FileLoad).await })
    };
    assert!(first.await.unwrap_err().is_panic());
    assert!(coordinator.cache().is_empty());
    fx.take_seen();

    fx.graph.write().set_params("a", json!({"value": 10})).unwrap();
    coordinator.handle_trigger(Trigger::PropertyChange).await.unwrap();
    assert_eq!(fx.take_seen()[0], ("seen_total".to_string(), json!(15.0)));
}
