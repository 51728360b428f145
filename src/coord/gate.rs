//! Compilation gate
//!
//! One flag per coordinator: "an update may start". Taking it is a single
//! compare-exchange so two triggers racing from different threads can never
//! both get in.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug)]
pub struct CompilationGate {
    permitted: AtomicBool,
}

impl CompilationGate {
    pub fn new() -> Self {
        Self {
            permitted: AtomicBool::new(true),
        }
    }

    /// Take the gate, or `None` when an update is already in flight.
    ///
    /// The gate is handed back when the guard drops, whichever way the caller
    /// leaves its scope.
    pub fn try_acquire(&self) -> Option<GateGuard<'_>> {
        self.permitted
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GateGuard { gate: self })
    }

    pub fn is_permitted(&self) -> bool {
        self.permitted.load(Ordering::Acquire)
    }
}

impl Default for CompilationGate {
    fn default() -> Self {
        Self::new()
    }
}

#[must_use = "the gate is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct GateGuard<'a> {
    gate: &'a CompilationGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.permitted.store(true, Ordering::Release);
    }
}
