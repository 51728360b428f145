//! Source programs and the traits the coordinator compiles and runs them through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::cache::ExecutionCache;

/// Text of one compiled unit, generated for one independent network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceProgram {
    /// Position in generation order
    pub index: usize,
    pub text: String,
}

impl SourceProgram {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }
}

impl fmt::Display for SourceProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Translates the current graph into one program per independent network.
///
/// Must not keep state between calls.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> anyhow::Result<Vec<SourceProgram>>;
}

/// Turns a source program into something runnable.
///
/// Implementations must not mutate shared state: a rebuild that fails halfway
/// is thrown away as if it never happened.
pub trait ProgramCompiler: Send + Sync {
    fn compile(&self, source: &SourceProgram) -> anyhow::Result<Arc<dyn Executable>>;
}

/// A compiled program
#[async_trait]
pub trait Executable: Send + Sync {
    async fn run(&self, ctx: &RunContext) -> anyhow::Result<()>;
}

/// Execution context handed to one run of one artifact.
///
/// A fresh context is built for every run so nothing leaks between artifacts
/// or between updates, except what goes through the shared cache.
#[derive(Clone)]
pub struct RunContext {
    /// Index of the artifact being run
    pub index: usize,
    pub cache: ExecutionCache,
    pub profiling: bool,
    locals: Arc<parking_lot::Mutex<HashMap<String, serde_json::Value>>>,
}

impl RunContext {
    pub fn new(index: usize, cache: ExecutionCache, profiling: bool) -> Self {
        Self {
            index,
            cache,
            profiling,
            locals: Arc::new(parking_lot::Mutex::new(HashMap::new())),
        }
    }

    /// Store a run-local value
    pub fn set_local(&self, key: impl Into<String>, value: serde_json::Value) {
        self.locals.lock().insert(key.into(), value);
    }

    pub fn local(&self, key: &str) -> Option<serde_json::Value> {
        self.locals.lock().get(key).cloned()
    }
}

/// Adapts a plain async closure into an `Executable`
pub struct FnExecutable<F> {
    func: F,
}

impl<F> FnExecutable<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> Executable for FnExecutable<F>
where
    F: Fn(RunContext) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn run(&self, ctx: &RunContext) -> anyhow::Result<()> {
        (self.func)(ctx.clone()).await
    }
}
