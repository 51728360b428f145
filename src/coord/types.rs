//! Result types for update cycles

use std::time::Duration;

/// What `request_update` did
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Another update was in flight; nothing was touched
    Skipped,
    /// The trigger is switched off in the configuration
    Disabled,
    Completed(UpdateReport),
}

impl UpdateOutcome {
    pub fn report(&self) -> Option<&UpdateReport> {
        match self {
            Self::Completed(report) => Some(report),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildStatus {
    /// Programs were reused as they were
    NotRequested,
    Rebuilt { artifacts: usize },
    /// Generation or compilation failed; previous programs were kept
    Abandoned,
}

/// Outcome of running one artifact
#[derive(Debug)]
pub enum RunOutcome {
    Success,
    Failure(anyhow::Error),
}

impl RunOutcome {
    pub fn from_result(result: anyhow::Result<()>) -> Self {
        match result {
            Ok(()) => Self::Success,
            Err(e) => Self::Failure(e),
        }
    }
}

/// Summary of one completed update
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateReport {
    pub rebuild: RebuildStatus,
    /// Extra rebuilds performed while recovering from failures
    pub recovery_rebuilds: usize,
    /// Successful artifact runs, retries included
    pub executed: usize,
    /// Indices of artifacts that still failed after their retry
    pub failed: Vec<usize>,
    /// Indices of artifacts that succeeded on retry
    pub recovered: Vec<usize>,
    /// Size of the store at the end of the run phase
    pub artifact_count: usize,
    pub elapsed: Duration,
}

impl UpdateReport {
    pub(crate) fn new(rebuild: RebuildStatus) -> Self {
        Self {
            rebuild,
            recovery_rebuilds: 0,
            executed: 0,
            failed: Vec::new(),
            recovered: Vec::new(),
            artifact_count: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.recovered.is_empty() && self.rebuild != RebuildStatus::Abandoned
    }

    /// Updates per second implied by `elapsed`
    pub fn rate(&self) -> Option<f64> {
        let secs = self.elapsed.as_secs_f64();
        (secs > 0.0).then(|| 1.0 / secs)
    }
}
