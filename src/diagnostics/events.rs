//! Diagnostic events emitted by the coordinator
//!
//! Nothing inside the engine reads these back; they exist so operators can see
//! contained failures and stale runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DiagnosticEvent {
    /// A trigger arrived while another update was in flight
    UpdateSkipped,
    RebuildCompleted {
        artifacts: usize,
    },
    /// The store kept its previous artifacts
    RebuildAbandoned {
        category: String,
        message: String,
    },
    ArtifactFailed {
        index: usize,
        message: String,
        retried: bool,
    },
    ArtifactRecovered {
        index: usize,
    },
    UpdateTimed {
        elapsed_secs: f64,
        rate: Option<f64>,
    },
}

/// Event envelope with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticEnvelope {
    pub sequence: u64,
    pub update_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: DiagnosticEvent,
}

/// Receives diagnostic events
pub trait DiagnosticsSink: Send + Sync {
    fn emit(&self, envelope: &DiagnosticEnvelope);
}

/// Forwards events to `tracing`
pub struct LoggingDiagnostics;

impl DiagnosticsSink for LoggingDiagnostics {
    fn emit(&self, envelope: &DiagnosticEnvelope) {
        match &envelope.event {
            DiagnosticEvent::UpdateSkipped => {
                tracing::debug!(update_id = %envelope.update_id, "update skipped, another one is in flight");
            }
            DiagnosticEvent::RebuildCompleted { artifacts } => {
                tracing::debug!(update_id = %envelope.update_id, artifacts, "rebuild completed");
            }
            DiagnosticEvent::RebuildAbandoned { category, message } => {
                tracing::warn!(update_id = %envelope.update_id, category = %category, "rebuild abandoned, keeping previous programs: {}", message);
            }
            DiagnosticEvent::ArtifactFailed { index, message, retried } => {
                tracing::error!(update_id = %envelope.update_id, index, retried, "program failed: {}", message);
            }
            DiagnosticEvent::ArtifactRecovered { index } => {
                tracing::info!(update_id = %envelope.update_id, index, "program recovered after rebuild");
            }
            DiagnosticEvent::UpdateTimed { elapsed_secs, rate } => {
                tracing::debug!(update_id = %envelope.update_id, elapsed_secs, ?rate, "update timed");
            }
        }
    }
}

/// Collects events in memory
#[derive(Default)]
pub struct BufferingDiagnostics {
    events: Arc<parking_lot::RwLock<Vec<DiagnosticEnvelope>>>,
}

impl BufferingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_events(&self) -> Vec<DiagnosticEnvelope> {
        self.events.read().clone()
    }

    /// Just the event payloads, in emission order
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.read().iter().map(|e| e.event.clone()).collect()
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl DiagnosticsSink for BufferingDiagnostics {
    fn emit(&self, envelope: &DiagnosticEnvelope) {
        self.events.write().push(envelope.clone());
    }
}
