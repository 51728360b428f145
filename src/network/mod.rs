//! Reference pipeline: node graph → network scripts → compiled scripts.
//!
//! Hosts with their own graph model only need to implement `CodeGenerator`
//! and `ProgramCompiler`; this module is what the engine uses out of the box.

pub mod action;
pub mod codegen;
pub mod graph;
pub mod registry;
pub mod script;

pub use action::{ConstantAction, EchoAction, NodeAction, NodeCtx, SumAction};
pub use codegen::NetworkCodeGenerator;
pub use graph::{GraphDefinition, NodeDefinition, NodeGraph};
pub use registry::ActionRegistry;
pub use script::{CompiledScript, ScriptCompiler, OUTPUT_KEY};
