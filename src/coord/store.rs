//! Artifact store
//!
//! The ordered programs of the last successful rebuild, kept as one immutable
//! set behind an `Arc`. Readers take a snapshot; a rebuild swaps the whole set.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::program::{Executable, SourceProgram};

/// A source program and the artifact compiled from it
#[derive(Clone)]
pub struct CompiledProgram {
    pub source: SourceProgram,
    pub artifact: Arc<dyn Executable>,
}

impl std::fmt::Debug for CompiledProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledProgram")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Everything produced by one compilation pass
#[derive(Debug, Default)]
pub struct ArtifactSet {
    /// Bumped on every replacement
    pub generation: u64,
    pub programs: Vec<CompiledProgram>,
}

impl ArtifactSet {
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CompiledProgram> {
        self.programs.get(index)
    }
}

#[derive(Debug, Default)]
pub struct ArtifactStore {
    current: RwLock<Arc<ArtifactSet>>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<ArtifactSet> {
        self.current.read().clone()
    }

    /// Swap in a complete new set of programs
    pub fn replace(&self, programs: Vec<CompiledProgram>) -> Arc<ArtifactSet> {
        let mut current = self.current.write();
        let next = Arc::new(ArtifactSet {
            generation: current.generation + 1,
            programs,
        });
        *current = next.clone();
        next
    }

    pub fn clear(&self) {
        self.replace(Vec::new());
    }

    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }

    pub fn sources(&self) -> Vec<SourceProgram> {
        self.current
            .read()
            .programs
            .iter()
            .map(|p| p.source.clone())
            .collect()
    }
}
