//! ExecutionCoordinator - decides rebuild vs reuse and runs the programs
//!
//! Every host trigger ends up in `request_update`. One update runs at a time;
//! anything arriving while an update is in flight (including triggers fired
//! from inside a running program) is dropped.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::cache::ExecutionCache;
use crate::config::{EngineConfig, RecoveryMode, RetryTarget};
use crate::coord::gate::CompilationGate;
use crate::coord::store::{ArtifactSet, ArtifactStore, CompiledProgram};
use crate::coord::types::{RebuildStatus, RunOutcome, UpdateOutcome, UpdateReport};
use crate::core::errors::{EngineError, Result};
use crate::diagnostics::{DiagnosticEnvelope, DiagnosticEvent, DiagnosticsSink, StatsSnapshot, UpdateStats};
use crate::program::{CodeGenerator, Executable, ProgramCompiler, RunContext, SourceProgram};

const SOURCE_SEPARATOR_WIDTH: usize = 80;

pub struct ExecutionCoordinator {
    generator: Arc<dyn CodeGenerator>,
    compiler: Arc<dyn ProgramCompiler>,
    cache: ExecutionCache,
    config: RwLock<EngineConfig>,
    gate: CompilationGate,
    store: ArtifactStore,
    diagnostics: Option<Arc<dyn DiagnosticsSink>>,
    stats: UpdateStats,
    sequence: AtomicU64,
}

impl ExecutionCoordinator {
    pub fn new(generator: Arc<dyn CodeGenerator>, compiler: Arc<dyn ProgramCompiler>) -> Self {
        Self {
            generator,
            compiler,
            cache: ExecutionCache::new(),
            config: RwLock::new(EngineConfig::default()),
            gate: CompilationGate::new(),
            store: ArtifactStore::new(),
            diagnostics: None,
            stats: UpdateStats::new(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn with_config(self, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        *self.config.write() = config;
        Ok(self)
    }

    /// Share an execution cache owned by the host
    pub fn with_cache(mut self, cache: ExecutionCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    pub fn config(&self) -> EngineConfig {
        self.config.read().clone()
    }

    /// Takes effect from the next update
    pub fn set_config(&self, config: EngineConfig) -> Result<()> {
        config.validate()?;
        *self.config.write() = config;
        Ok(())
    }

    pub fn cache(&self) -> &ExecutionCache {
        &self.cache
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_update_in_flight(&self) -> bool {
        !self.gate.is_permitted()
    }

    pub fn artifact_count(&self) -> usize {
        self.store.len()
    }

    /// Generation counter of the stored programs; bumps on every replacement
    pub fn store_generation(&self) -> u64 {
        self.store.generation()
    }

    pub fn artifacts(&self) -> Arc<ArtifactSet> {
        self.store.snapshot()
    }

    /// Sources of the programs currently stored, in generation order
    pub fn sources(&self) -> Vec<SourceProgram> {
        self.store.sources()
    }

    /// Human-readable dump of the stored sources
    pub fn render_sources(&self) -> String {
        let separator = "-".repeat(SOURCE_SEPARATOR_WIDTH);
        let mut out = String::new();
        for source in self.store.sources() {
            out.push_str(&source.text);
            out.push_str("\n\n");
            out.push_str(&separator);
            out.push_str("\n\n");
        }
        out
    }

    /// Drop all stored programs, e.g. when the host reloads.
    ///
    /// Returns false (and does nothing) while an update is in flight.
    pub fn reset(&self) -> bool {
        match self.gate.try_acquire() {
            Some(_guard) => {
                self.store.clear();
                true
            }
            None => false,
        }
    }

    /// Run one update cycle.
    ///
    /// `force_rebuild` means the graph topology changed and the programs must
    /// be regenerated before running.
    #[instrument(skip(self))]
    pub async fn request_update(&self, force_rebuild: bool) -> Result<UpdateOutcome> {
        let update_id = Uuid::new_v4();
        let Some(_guard) = self.gate.try_acquire() else {
            debug!("update already in flight, skipping");
            self.stats.record_skipped();
            self.emit(update_id, DiagnosticEvent::UpdateSkipped);
            return Ok(UpdateOutcome::Skipped);
        };

        // Declared after the gate guard so it drops first, on every exit path
        let clear_cache = self.cache.clear_on_drop();

        let config = self.config.read().clone();
        let start = Instant::now();

        let rebuild = if force_rebuild {
            self.rebuild(update_id)
        } else {
            RebuildStatus::NotRequested
        };

        let mut report = UpdateReport::new(rebuild);
        let run = self.run_phase(update_id, &config, &mut report).await;

        drop(clear_cache);

        report.elapsed = start.elapsed();
        report.artifact_count = self.store.len();
        self.stats.record_update(report.elapsed);
        if config.print_update_time {
            self.report_timing(update_id, &report);
        }

        run?;
        Ok(UpdateOutcome::Completed(report))
    }

    /// Regenerate and recompile everything; the store only changes when every
    /// step succeeds
    fn rebuild(&self, update_id: Uuid) -> RebuildStatus {
        match self.compile_all() {
            Ok(programs) => {
                let artifacts = programs.len();
                self.store.replace(programs);
                self.stats.record_rebuild(true);
                debug!(artifacts, "programs rebuilt");
                self.emit(update_id, DiagnosticEvent::RebuildCompleted { artifacts });
                RebuildStatus::Rebuilt { artifacts }
            }
            Err(e) => {
                self.stats.record_rebuild(false);
                warn!(
                    "rebuild abandoned, keeping {} previous programs: {}",
                    self.store.len(),
                    e
                );
                self.emit(
                    update_id,
                    DiagnosticEvent::RebuildAbandoned {
                        category: e.category().to_string(),
                        message: e.to_string(),
                    },
                );
                RebuildStatus::Abandoned
            }
        }
    }

    fn compile_all(&self) -> Result<Vec<CompiledProgram>> {
        let sources = self.generator.generate().map_err(EngineError::generation)?;
        sources
            .into_iter()
            .map(|source| {
                let artifact = self
                    .compiler
                    .compile(&source)
                    .map_err(|e| EngineError::compilation(source.index, e))?;
                Ok(CompiledProgram { source, artifact })
            })
            .collect()
    }

    async fn run_phase(
        &self,
        update_id: Uuid,
        config: &EngineConfig,
        report: &mut UpdateReport,
    ) -> Result<()> {
        let mode = config.recovery_mode();
        let mut index = 0;

        // Re-read the store every step: a recovery rebuild may have swapped it.
        while let Some(program) = self.store.snapshot().get(index).cloned() {
            let err = match self.run_artifact(index, &program.artifact, config).await {
                RunOutcome::Success => {
                    report.executed += 1;
                    index += 1;
                    continue;
                }
                RunOutcome::Failure(err) => err,
            };
            self.stats.record_runtime_failure();

            if mode == RecoveryMode::Strict {
                self.emit(
                    update_id,
                    DiagnosticEvent::ArtifactFailed {
                        index,
                        message: format!("{:#}", err),
                        retried: false,
                    },
                );
                return Err(EngineError::runtime(index, err));
            }

            warn!(index, "program failed, rebuilding before retry: {:#}", err);
            self.rebuild(update_id);
            report.recovery_rebuilds += 1;

            let retry = match config.retry_target {
                RetryTarget::FailedArtifact => Some(program.artifact.clone()),
                RetryTarget::RefreshedArtifact => self
                    .store
                    .snapshot()
                    .get(index)
                    .map(|p| p.artifact.clone()),
            };

            match retry {
                Some(artifact) => match self.run_artifact(index, &artifact, config).await {
                    RunOutcome::Success => {
                        report.executed += 1;
                        report.recovered.push(index);
                        self.stats.record_recovered();
                        self.emit(update_id, DiagnosticEvent::ArtifactRecovered { index });
                    }
                    RunOutcome::Failure(retry_err) => {
                        error!(index, "program failed again after rebuild: {:#}", retry_err);
                        report.failed.push(index);
                        self.emit(
                            update_id,
                            DiagnosticEvent::ArtifactFailed {
                                index,
                                message: format!("{:#}", retry_err),
                                retried: true,
                            },
                        );
                    }
                },
                None => {
                    // the rebuilt sequence no longer reaches this index
                    report.failed.push(index);
                    self.emit(
                        update_id,
                        DiagnosticEvent::ArtifactFailed {
                            index,
                            message: format!("{:#}", err),
                            retried: false,
                        },
                    );
                }
            }
            index += 1;
        }

        Ok(())
    }

    async fn run_artifact(
        &self,
        index: usize,
        artifact: &Arc<dyn Executable>,
        config: &EngineConfig,
    ) -> RunOutcome {
        let ctx = RunContext::new(index, self.cache.clone(), config.node_execution_profiling);
        RunOutcome::from_result(artifact.run(&ctx).await)
    }

    fn report_timing(&self, update_id: Uuid, report: &UpdateReport) {
        let elapsed_secs = report.elapsed.as_secs_f64();
        let rate = report.rate();
        match rate {
            Some(rate) => info!("Exec. {:.7} s  -  {:.5} fps", elapsed_secs, rate),
            None => info!("Exec. {:.7} s", elapsed_secs),
        }
        self.emit(update_id, DiagnosticEvent::UpdateTimed { elapsed_secs, rate });
    }

    fn emit(&self, update_id: Uuid, event: DiagnosticEvent) {
        if let Some(sink) = &self.diagnostics {
            let envelope = DiagnosticEnvelope {
                sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
                update_id,
                timestamp: chrono::Utc::now(),
                event,
            };
            sink.emit(&envelope);
        }
    }
}
