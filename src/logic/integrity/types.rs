//! Integrity Types

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::config_edit::ConfigEditError;

// ============================================================================
// BASELINES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBaseline {
    pub path: String,
    pub checksum: String,
    pub captured_at: DateTime<Utc>,
}

/// Why a path has no baseline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "reason")]
pub enum BaselineFault {
    Missing,
    Unreadable(String),
}

/// Result of `capture_baseline`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaselineCapture {
    pub entries: BTreeMap<String, Result<FileBaseline, BaselineFault>>,
    /// Set when the channel died; `entries` then only covers the paths before it
    pub unreachable: Option<String>,
}

impl BaselineCapture {
    pub fn is_complete(&self) -> bool {
        self.unreachable.is_none()
    }

    pub fn checksum(&self, path: &str) -> Option<&str> {
        match self.entries.get(path) {
            Some(Ok(baseline)) => Some(baseline.checksum.as_str()),
            _ => None,
        }
    }

    pub fn missing(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, entry)| matches!(entry, Err(BaselineFault::Missing)))
            .map(|(path, _)| path.clone())
            .collect()
    }
}

// ============================================================================
// BACKUPS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: String,
    pub original_path: String,
    pub local_storage_path: PathBuf,
    /// SHA-256 (hex) of the pulled content
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

/// Result of a successful `modify_config`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyOutcome {
    pub backup_id: String,
    pub original_value: Option<String>,
}

// ============================================================================
// MONITORING
// ============================================================================

/// One observed modification. `None` checksum = file absent at that observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityChange {
    pub path: String,
    pub previous_checksum: Option<String>,
    pub current_checksum: Option<String>,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorOutcome {
    pub changes: Vec<IntegrityChange>,
    /// The full duration elapsed without cancellation or fault
    pub completed: bool,
    pub cancelled: bool,
    /// Distinguishable fault that stopped the watch (e.g. device unreachable)
    pub fault: Option<String>,
    pub polls: u32,
    pub paths_watched: usize,
    /// Paths absent at the last observation
    pub missing: Vec<String>,
}

impl MonitorOutcome {
    pub fn summary(&self) -> IntegritySummary {
        IntegritySummary {
            paths_watched: self.paths_watched,
            changes: self.changes.clone(),
            missing: self.missing.clone(),
            completed: self.completed,
            fault: self.fault.clone(),
        }
    }
}

/// What the file-integrity scoring category consumes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegritySummary {
    pub paths_watched: usize,
    pub changes: Vec<IntegrityChange>,
    pub missing: Vec<String>,
    pub completed: bool,
    pub fault: Option<String>,
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum IntegrityError {
    /// Backup blob no longer matches its recorded checksum; nothing was written
    #[error("integrity verification failed for backup {backup_id}: expected {expected}, found {actual}")]
    VerificationFailed {
        backup_id: String,
        expected: String,
        actual: String,
    },

    #[error("backup not found: {0}")]
    BackupNotFound(String),

    #[error("backup {backup_id} blob missing at {path}")]
    BackupBlobMissing { backup_id: String, path: String },

    #[error("failed to pull {path}: {reason}")]
    PullFailed { path: String, reason: String },

    /// Push failed; the backup is kept for manual recovery
    #[error("failed to push {path} (backup {backup_id} kept): {reason}")]
    PushFailed {
        path: String,
        backup_id: String,
        reason: String,
    },

    /// Edit could not be applied; the backup is kept
    #[error("config edit failed (backup {backup_id} kept): {source}")]
    ConfigFormat {
        backup_id: String,
        #[source]
        source: ConfigEditError,
    },

    #[error("monitor session already active for: {}", .paths.join(", "))]
    SessionConflict { paths: Vec<String> },

    #[error("device unreachable: {0}")]
    DeviceUnreachable(String),

    #[error("backup store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backup metadata error: {0}")]
    Serialization(#[from] serde_json::Error),
}
