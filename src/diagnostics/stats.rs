//! Aggregate counters across updates

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct UpdateStats {
    /// Updates that ran a full cycle
    pub updates: AtomicU64,
    /// Updates dropped because another one was in flight
    pub skipped_reentrant: AtomicU64,
    pub rebuilds: AtomicU64,
    pub rebuilds_abandoned: AtomicU64,
    pub runtime_failures: AtomicU64,
    /// Failures that succeeded on retry
    pub recovered: AtomicU64,
    pub total_update_time_us: AtomicU64,
}

impl UpdateStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_update(&self, elapsed: Duration) {
        self.updates.fetch_add(1, Ordering::Relaxed);
        self.total_update_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped_reentrant.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rebuild(&self, succeeded: bool) {
        if succeeded {
            self.rebuilds.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rebuilds_abandoned.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_runtime_failure(&self) {
        self.runtime_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recovered(&self) {
        self.recovered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            updates: self.updates.load(Ordering::Relaxed),
            skipped_reentrant: self.skipped_reentrant.load(Ordering::Relaxed),
            rebuilds: self.rebuilds.load(Ordering::Relaxed),
            rebuilds_abandoned: self.rebuilds_abandoned.load(Ordering::Relaxed),
            runtime_failures: self.runtime_failures.load(Ordering::Relaxed),
            recovered: self.recovered.load(Ordering::Relaxed),
            total_update_time_us: self.total_update_time_us.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub updates: u64,
    pub skipped_reentrant: u64,
    pub rebuilds: u64,
    pub rebuilds_abandoned: u64,
    pub runtime_failures: u64,
    pub recovered: u64,
    pub total_update_time_us: u64,
}

impl StatsSnapshot {
    /// Mean update time, zero when nothing ran yet
    pub fn avg_update_time(&self) -> Duration {
        if self.updates == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(self.total_update_time_us / self.updates)
        }
    }
}
