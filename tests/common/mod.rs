//! Shared stubs for coordinator tests.
//!
//! `StubGenerator` hands out a settable list of program texts. `StubCompiler`
//! turns each text into an artifact whose behavior is picked by its prefix:
//!
//! - `ok:<name>` runs and records itself
//! - `flaky:<name>` fails on the first run of each compiled instance
//! - `once:<name>` fails the very first time any instance runs
//! - `broken:<name>` always fails
//! - `panic:<name>` panics
//! - `bad:<name>` does not compile
//! - `custom:<name>` uses an artifact installed with `StubCompiler::install`
//!
//! Every run is logged as `<name>#<serial>`, where the serial is the compile
//! order of the instance across the compiler's lifetime.
#![allow(dead_code)]

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use dagger_live::{CodeGenerator, Executable, ExecutionCoordinator, ProgramCompiler, RunContext, SourceProgram};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub type RunLog = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
pub struct StubGenerator {
    sources: Mutex<Vec<String>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl StubGenerator {
    pub fn new<S: Into<String>>(sources: impl IntoIterator<Item = S>) -> Arc<Self> {
        let generator = Self::default();
        generator.set_sources(sources);
        Arc::new(generator)
    }

    pub fn set_sources<S: Into<String>>(&self, sources: impl IntoIterator<Item = S>) {
        *self.sources.lock() = sources.into_iter().map(Into::into).collect();
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CodeGenerator for StubGenerator {
    fn generate(&self) -> anyhow::Result<Vec<SourceProgram>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            bail!("malformed topology");
        }
        Ok(self
            .sources
            .lock()
            .iter()
            .enumerate()
            .map(|(index, text)| SourceProgram::new(index, text.clone()))
            .collect())
    }
}

#[derive(Default)]
pub struct StubCompiler {
    pub log: RunLog,
    serial: AtomicUsize,
    failed_once: Arc<Mutex<HashSet<String>>>,
    installed: Mutex<HashMap<String, Arc<dyn Executable>>>,
}

impl StubCompiler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn install(&self, name: &str, artifact: Arc<dyn Executable>) {
        self.installed.lock().insert(name.to_string(), artifact);
    }

    pub fn runs(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn clear_runs(&self) {
        self.log.lock().clear();
    }

    pub fn compiled(&self) -> usize {
        self.serial.load(Ordering::SeqCst)
    }
}

impl ProgramCompiler for StubCompiler {
    fn compile(&self, source: &SourceProgram) -> anyhow::Result<Arc<dyn Executable>> {
        let (kind, name) = source
            .text
            .split_once(':')
            .ok_or_else(|| anyhow!("no kind in `{}`", source.text))?;
        if kind == "bad" {
            bail!("syntax error in `{}`", name);
        }
        if kind == "custom" {
            return self
                .installed
                .lock()
                .get(name)
                .cloned()
                .ok_or_else(|| anyhow!("nothing installed for `{}`", name));
        }

        let serial = self.serial.fetch_add(1, Ordering::SeqCst);
        let behavior = match kind {
            "ok" => Behavior::Ok,
            "flaky" => Behavior::Flaky(AtomicBool::new(false)),
            "once" => Behavior::Once(self.failed_once.clone()),
            "broken" => Behavior::Broken,
            "panic" => Behavior::Panic,
            other => bail!("unknown kind `{}`", other),
        };
        Ok(Arc::new(StubArtifact {
            label: format!("{}#{}", name, serial),
            name: name.to_string(),
            behavior,
            log: self.log.clone(),
        }))
    }
}

enum Behavior {
    Ok,
    /// Set once this instance has run
    Flaky(AtomicBool),
    Once(Arc<Mutex<HashSet<String>>>),
    Broken,
    Panic,
}

struct StubArtifact {
    label: String,
    name: String,
    behavior: Behavior,
    log: RunLog,
}

#[async_trait]
impl Executable for StubArtifact {
    async fn run(&self, ctx: &RunContext) -> anyhow::Result<()> {
        self.log.lock().push(self.label.clone());
        match &self.behavior {
            Behavior::Ok => {}
            Behavior::Flaky(ran) => {
                if !ran.swap(true, Ordering::SeqCst) {
                    bail!("{} failed on first run", self.label);
                }
            }
            Behavior::Once(failed) => {
                if failed.lock().insert(self.name.clone()) {
                    bail!("{} failed once", self.label);
                }
            }
            Behavior::Broken => bail!("{} is broken", self.label),
            Behavior::Panic => panic!("{} panicked", self.label),
        }
        ctx.cache.insert_value(&self.name, "output", &ctx.index)?;
        Ok(())
    }
}

pub fn coordinator(generator: &Arc<StubGenerator>, compiler: &Arc<StubCompiler>) -> ExecutionCoordinator {
    ExecutionCoordinator::new(generator.clone(), compiler.clone())
}

/// Route `tracing` output through the test harness
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
