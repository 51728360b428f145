//! Engine configuration
//!
//! Mirrors the per-scene toggles the host exposes: which triggers re-run the
//! graph, whether failures are shown in full, and timing output.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::errors::{EngineError, Result};

/// Which artifact a resilient retry runs after the recovery rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryTarget {
    /// Retry the artifact instance that failed, then continue at the next
    /// index of whatever sequence the rebuild produced
    #[default]
    FailedArtifact,
    /// Retry the artifact now stored at the failed index and continue over
    /// the rebuilt sequence
    RefreshedArtifact,
}

/// How runtime failures are handled during the run phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryMode {
    /// Propagate the first failure out of `request_update`
    Strict,
    /// Rebuild, retry once, then report and move on
    Resilient,
}

/// Configuration for update behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Surface runtime failures to the caller instead of recovering
    pub show_full_error: bool,
    /// Report elapsed time and rate after each update
    pub print_update_time: bool,
    /// Forwarded to each run context
    pub node_execution_profiling: bool,
    /// Re-run on frame changes
    pub update_on_frame_change: bool,
    /// Re-run on host scene updates
    pub update_on_scene_update: bool,
    /// Re-run when a node property is edited
    pub update_on_property_change: bool,
    /// Resilient-mode retry behavior
    pub retry_target: RetryTarget,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            show_full_error: false,
            print_update_time: false,
            node_execution_profiling: false,
            update_on_frame_change: true,
            update_on_scene_update: true,
            update_on_property_change: true,
            retry_target: RetryTarget::default(),
        }
    }
}

/// Partial configuration used for layering overrides on top of a base
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverride {
    pub show_full_error: Option<bool>,
    pub print_update_time: Option<bool>,
    pub node_execution_profiling: Option<bool>,
    pub update_on_frame_change: Option<bool>,
    pub update_on_scene_update: Option<bool>,
    pub update_on_property_change: Option<bool>,
    pub retry_target: Option<RetryTarget>,
}

impl EngineConfig {
    pub fn recovery_mode(&self) -> RecoveryMode {
        if self.show_full_error {
            RecoveryMode::Strict
        } else {
            RecoveryMode::Resilient
        }
    }

    /// Validates configuration values
    pub fn validate(&self) -> Result<()> {
        // retry_target only matters when failures are recovered
        if self.show_full_error && self.retry_target != RetryTarget::default() {
            return Err(EngineError::configuration_field(
                "retry_target has no effect when show_full_error is enabled",
                "retry_target",
            ));
        }
        Ok(())
    }

    /// Merges an override into a base configuration, override taking precedence
    pub fn merge(base: &Self, override_with: &ConfigOverride) -> Result<Self> {
        let merged = Self {
            show_full_error: override_with.show_full_error.unwrap_or(base.show_full_error),
            print_update_time: override_with
                .print_update_time
                .unwrap_or(base.print_update_time),
            node_execution_profiling: override_with
                .node_execution_profiling
                .unwrap_or(base.node_execution_profiling),
            update_on_frame_change: override_with
                .update_on_frame_change
                .unwrap_or(base.update_on_frame_change),
            update_on_scene_update: override_with
                .update_on_scene_update
                .unwrap_or(base.update_on_scene_update),
            update_on_property_change: override_with
                .update_on_property_change
                .unwrap_or(base.update_on_property_change),
            retry_target: override_with.retry_target.unwrap_or(base.retry_target),
        };

        merged.validate()?;
        Ok(merged)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::io(format!("read config {}", path.display()), e))?;
        Self::from_yaml_str(&content)
    }
}
