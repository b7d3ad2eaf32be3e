//! Engine Configuration
//!
//! Runtime knobs for one `AssessmentEngine`. Defaults come from
//! `constants.rs`; `from_env` applies the `DEVICE_GUARD_*` overrides and
//! `load` reads a JSON file (missing fields keep their defaults).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants;
use crate::logic::detection::DetectionThresholds;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

// ============================================================================
// ENGINE CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deadline for every Device Shell call (ms)
    pub shell_timeout_ms: u64,
    /// Integrity monitor polling period (ms)
    pub poll_interval_ms: u64,
    /// Evidence cache TTL (seconds); 0 disables caching
    pub cache_ttl_secs: u64,
    pub backup_dir: PathBuf,
    /// Remote checksum command, `{path}` is substituted
    pub checksum_command: String,
    pub thresholds: DetectionThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shell_timeout_ms: constants::DEFAULT_SHELL_TIMEOUT_MS,
            poll_interval_ms: constants::DEFAULT_POLL_INTERVAL_MS,
            cache_ttl_secs: constants::DEFAULT_CACHE_TTL_SECS,
            backup_dir: constants::default_backup_dir(),
            checksum_command: constants::DEFAULT_CHECKSUM_COMMAND.to_string(),
            thresholds: DetectionThresholds::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `DEVICE_GUARD_*` environment variables
    pub fn from_env() -> Self {
        Self {
            shell_timeout_ms: constants::get_shell_timeout_ms(),
            poll_interval_ms: constants::get_poll_interval_ms(),
            cache_ttl_secs: constants::get_cache_ttl_secs(),
            backup_dir: constants::get_backup_dir(),
            checksum_command: constants::get_checksum_command(),
            thresholds: DetectionThresholds::default(),
        }
    }

    /// Read a JSON config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        log::info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    /// Shorter deadlines and a faster monitor, for tests and CI devices
    pub fn fast() -> Self {
        Self {
            shell_timeout_ms: 2_000,
            poll_interval_ms: 250,
            cache_ttl_secs: 5,
            ..Default::default()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

// ============================================================================
// TESTS
// ============================================================================
