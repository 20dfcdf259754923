//! Scheduler configuration, loadable from JSON.
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    Io { path: String, source: std::io::Error },
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Schedule the own outbound of boundary nodes that have a single internal
    /// edge (naive mean-field factorization).
    pub univariate_outbounds: bool,
    pub include_time_wraps: bool,
    pub include_write_buffers: bool,
    /// Generate per-subgraph schedules concurrently in `schedule_all`.
    pub parallel: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            univariate_outbounds: true,
            include_time_wraps: true,
            include_write_buffers: true,
            parallel: false,
        }
    }
}

impl SchedulerConfig {
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        Self::from_json(&raw)
    }
}
