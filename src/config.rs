// src/config.rs

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pos::{ConfigurationError, MilestoneConfig, MilestoneSchedule, NetworkClock};

pub const DEFAULT_TICK_MS: u64 = 1000;

/// Node-level configuration: network genesis, loop cadence, our own rotation slot
/// and the milestone list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    #[serde(default)]
    pub genesis_unix_secs: u64,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default)]
    pub delegate_index: u32,
    pub milestones: Vec<MilestoneConfig>,
}

fn default_tick_ms() -> u64 {
    DEFAULT_TICK_MS
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid milestone schedule: {0}")]
    Schedule(#[from] ConfigurationError),
    #[error("tickMs must be > 0")]
    ZeroTick,
}

impl NodeConfig {
    /// Parse and validate a JSON document. The milestone schedule is materialized once
    /// here so a malformed schedule never reaches the forging loop.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigLoadError> {
        let cfg: NodeConfig = serde_json::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigLoadError::Io { path: path.to_path_buf(), source })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.tick_ms == 0 {
            return Err(ConfigLoadError::ZeroTick);
        }
        self.schedule()?;
        Ok(())
    }

    pub fn schedule(&self) -> Result<MilestoneSchedule, ConfigurationError> {
        MilestoneSchedule::materialize(self.milestones.clone())
    }

    pub fn clock(&self) -> NetworkClock {
        NetworkClock::new(self.genesis_unix_secs)
    }
}
