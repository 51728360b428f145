// Core infrastructure
pub mod core {
    pub mod errors;
}

pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod program;

// Update coordination: gate, artifact store, triggers
pub mod coord;

// Reference graph -> script -> compiled script pipeline
pub mod network;

// Re-exports for convenience
pub use cache::{ClearOnDrop, ExecutionCache};
pub use config::{ConfigOverride, EngineConfig, RecoveryMode, RetryTarget};
pub use coord::{
    ExecutionCoordinator, RebuildStatus, RunOutcome, Trigger, UpdateOutcome, UpdateReport,
};
pub use crate::core::errors::{EngineError, Result};
pub use diagnostics::{
    BufferingDiagnostics, DiagnosticEnvelope, DiagnosticEvent, DiagnosticsSink,
    LoggingDiagnostics, StatsSnapshot,
};
pub use program::{CodeGenerator, Executable, FnExecutable, ProgramCompiler, RunContext, SourceProgram};

use parking_lot::RwLock;
use std::sync::Arc;

/// Coordinator wired to the reference pipeline over a shared graph
pub fn network_coordinator(
    graph: Arc<RwLock<network::NodeGraph>>,
    registry: network::ActionRegistry,
) -> ExecutionCoordinator {
    ExecutionCoordinator::new(
        Arc::new(network::NetworkCodeGenerator::new(graph.clone())),
        Arc::new(network::ScriptCompiler::new(registry).with_live_params(graph)),
    )
}
