//! Host triggers
//!
//! Thin mapping from host notifications to `request_update` calls.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::coord::coordinator::ExecutionCoordinator;
use crate::coord::types::UpdateOutcome;
use crate::core::errors::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trigger {
    /// Timeline advanced to a new frame
    FrameChange,
    /// Host state changed
    SceneUpdate,
    /// A node property was edited
    PropertyChange,
    /// Nodes or links were added, removed or rewired
    TreeChanged,
    /// Explicit "force full update" from the user
    ForceRebuild,
    /// A file or session was loaded
    FileLoad,
}

impl Trigger {
    /// Whether this trigger implies the topology may have changed
    pub fn forces_rebuild(self) -> bool {
        matches!(self, Self::TreeChanged | Self::ForceRebuild | Self::FileLoad)
    }

    pub fn is_enabled(self, config: &EngineConfig) -> bool {
        match self {
            Self::FrameChange => config.update_on_frame_change,
            Self::SceneUpdate => config.update_on_scene_update,
            Self::PropertyChange => config.update_on_property_change,
            Self::TreeChanged | Self::ForceRebuild | Self::FileLoad => true,
        }
    }
}

impl ExecutionCoordinator {
    /// Route a host notification to an update, honoring the enable flags
    pub async fn handle_trigger(&self, trigger: Trigger) -> Result<UpdateOutcome> {
        if !trigger.is_enabled(&self.config()) {
            tracing::trace!(?trigger, "trigger disabled");
            return Ok(UpdateOutcome::Disabled);
        }
        self.request_update(trigger.forces_rebuild()).await
    }
}
