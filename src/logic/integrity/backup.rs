//! Backup Store
//!
//! Local copies of device files taken before any modification.
//!
//! Features:
//! - Pull-then-hash backups with uuid ids (`<id>.bak` blobs)
//! - Verified restore: the bytes pushed are the bytes that were checked
//! - JSON metadata registry, reloaded on open
//! - Per-path async locks so two operations on one target never interleave;
//!   a path's lock entry is dropped once nobody holds or awaits it

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use super::checksum::{checksum_bytes, local_checksum};
use super::types::{BackupRecord, IntegrityError};
use crate::logic::shell::{ShellError, ShellHandle};

// ============================================================================
// CONSTANTS
// ============================================================================

const METADATA_FILE: &str = "backup_metadata.json";
const BLOB_EXTENSION: &str = "bak";
const STAGED_EXTENSION: &str = "staged";

// ============================================================================
// BACKUP STORE
// ============================================================================

/// Cheap to clone; clones share the registry and the path locks
#[derive(Clone)]
pub struct BackupStore {
    dir: PathBuf,
    records: Arc<RwLock<HashMap<String, BackupRecord>>>,
    locks: Arc<PathLocks>,
}

type PathLocks = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Exclusive hold on one remote path
pub struct PathLock {
    locks: Arc<PathLocks>,
    path: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PathLock {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map still refers to the mutex: no holder, no waiter
        let mut locks = self.locks.lock();
        if locks.get(&self.path).map_or(false, |m| Arc::strong_count(m) == 1) {
            locks.remove(&self.path);
        }
    }
}

impl BackupStore {
    /// Open (or create) a store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, IntegrityError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let store = Self {
            dir,
            records: Arc::new(RwLock::new(HashMap::new())),
            locks: Arc::new(Mutex::new(HashMap::new())),
        };
        store.load_metadata();
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Wait for exclusive use of `remote_path`
    pub async fn lock_path(&self, remote_path: &str) -> PathLock {
        let guard = self.path_mutex(remote_path).lock_owned().await;
        self.path_lock(remote_path, guard)
    }

    /// `lock_path` without waiting; `None` while another operation holds it
    pub fn try_lock_path(&self, remote_path: &str) -> Option<PathLock> {
        let guard = self.path_mutex(remote_path).try_lock_owned().ok()?;
        Some(self.path_lock(remote_path, guard))
    }

    /// Pull `remote_path` into the store and record its checksum
    pub async fn create_backup(
        &self,
        shell: &ShellHandle,
        remote_path: &str,
    ) -> Result<BackupRecord, IntegrityError> {
        let _lock = self.lock_path(remote_path).await;
        self.create_backup_unlocked(shell, remote_path).await
    }

    /// `create_backup` for callers already holding the path lock
    pub(crate) async fn create_backup_unlocked(
        &self,
        shell: &ShellHandle,
        remote_path: &str,
    ) -> Result<BackupRecord, IntegrityError> {
        let id = Uuid::new_v4().to_string();
        let blob = self.dir.join(format!("{}.{}", id, BLOB_EXTENSION));

        if let Err(e) = shell.pull_file(remote_path, &blob).await {
            let _ = fs::remove_file(&blob);
            log::warn!("Backup of {} failed: {}", remote_path, e);
            return Err(match e {
                ShellError::Unreachable(reason) => IntegrityError::DeviceUnreachable(reason),
                other => IntegrityError::PullFailed {
                    path: remote_path.to_string(),
                    reason: other.to_string(),
                },
            });
        }

        let checksum = match local_checksum(&blob) {
            Ok(checksum) => checksum,
            Err(e) => {
                let _ = fs::remove_file(&blob);
                return Err(e.into());
            }
        };

        let record = BackupRecord {
            id: id.clone(),
            original_path: remote_path.to_string(),
            local_storage_path: blob,
            checksum,
            created_at: Utc::now(),
        };

        self.records.write().insert(id, record.clone());
        self.save_metadata();

        log::info!("Backed up {} as {} ({})", remote_path, record.id, record.checksum);
        Ok(record)
    }

    /// Push a verified backup back to its original path.
    ///
    /// The blob is read and checked once, and that same content is staged
    /// and pushed, so later changes to the blob cannot reach the device.
    /// The record is consumed on success. On any failure the record and its
    /// blob stay in place.
    pub async fn restore(&self, shell: &ShellHandle, backup_id: &str) -> Result<(), IntegrityError> {
        let original_path = self
            .get(backup_id)
            .ok_or_else(|| IntegrityError::BackupNotFound(backup_id.to_string()))?
            .original_path;

        let _lock = self.lock_path(&original_path).await;

        // A concurrent restore may have consumed the record while we waited
        let record = self
            .get(backup_id)
            .ok_or_else(|| IntegrityError::BackupNotFound(backup_id.to_string()))?;

        let content = self.read_verified(&record)?;
        let staged = self.stage(&record.id, &content)?;
        let pushed = shell.push_file(&staged, &record.original_path).await;
        let _ = fs::remove_file(&staged);
        pushed.map_err(|e| push_error(&record, e))?;

        self.records.write().remove(backup_id);
        self.save_metadata();
        let _ = fs::remove_file(&record.local_storage_path);

        log::info!("Restored {} from backup {}", record.original_path, record.id);
        Ok(())
    }

    /// Blob content, provided it still matches the recorded checksum
    pub fn read_verified(&self, record: &BackupRecord) -> Result<Vec<u8>, IntegrityError> {
        let content = self.read_blob(record)?;
        let actual = checksum_bytes(&content);
        if actual != record.checksum {
            return Err(self.tampered(record, actual));
        }
        Ok(content)
    }

    /// Write edited content next to its backup, ready to push
    pub fn stage(&self, backup_id: &str, content: &[u8]) -> Result<PathBuf, IntegrityError> {
        let staged = self.dir.join(format!("{}.{}", backup_id, STAGED_EXTENSION));
        fs::write(&staged, content)?;
        Ok(staged)
    }

    /// All records, oldest first
    pub fn list(&self) -> Vec<BackupRecord> {
        let mut records: Vec<BackupRecord> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        records
    }

    pub fn get(&self, backup_id: &str) -> Option<BackupRecord> {
        self.records.read().get(backup_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Delete blobs and their records. Returns how many records went.
    ///
    /// Backups whose path is busy are left alone. A blob that cannot be
    /// deleted keeps its record; the first such error is returned after the
    /// registry has been saved.
    pub fn cleanup(&self) -> Result<usize, IntegrityError> {
        let mut removed = 0;
        let mut skipped = 0;
        let mut first_error: Option<std::io::Error> = None;

        for record in self.list() {
            let _lock = match self.try_lock_path(&record.original_path) {
                Some(lock) => lock,
                None => {
                    log::debug!("Cleanup skipped backup {}: {} is busy", record.id, record.original_path);
                    skipped += 1;
                    continue;
                }
            };

            match fs::remove_file(&record.local_storage_path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    log::warn!("Could not delete blob of backup {}: {}", record.id, e);
                    first_error.get_or_insert(e);
                    continue;
                }
            }
            self.records.write().remove(&record.id);
            removed += 1;
        }

        self.save_metadata();
        log::info!(
            "Backup store cleaned up: {} record(s) removed, {} busy, {} kept",
            removed,
            skipped,
            self.len()
        );
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(removed),
        }
    }

    // ------------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------------

    fn path_mutex(&self, remote_path: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(
            locks
                .entry(remote_path.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    fn path_lock(&self, remote_path: &str, guard: OwnedMutexGuard<()>) -> PathLock {
        PathLock {
            locks: Arc::clone(&self.locks),
            path: remote_path.to_string(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        self.locks.lock().len()
    }

    fn read_blob(&self, record: &BackupRecord) -> Result<Vec<u8>, IntegrityError> {
        fs::read(&record.local_storage_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                self.blob_missing(record)
            } else {
                IntegrityError::Io(e)
            }
        })
    }

    fn blob_missing(&self, record: &BackupRecord) -> IntegrityError {
        IntegrityError::BackupBlobMissing {
            backup_id: record.id.clone(),
            path: record.local_storage_path.to_string_lossy().to_string(),
        }
    }

    fn tampered(&self, record: &BackupRecord, actual: String) -> IntegrityError {
        log::warn!(
            "Backup {} for {} failed verification (expected {}, found {})",
            record.id,
            record.original_path,
            record.checksum,
            actual
        );
        IntegrityError::VerificationFailed {
            backup_id: record.id.clone(),
            expected: record.checksum.clone(),
            actual,
        }
    }

    /// Load metadata from disk, dropping records whose blob is gone
    fn load_metadata(&self) {
        let metadata_path = self.dir.join(METADATA_FILE);
        let content = match fs::read_to_string(&metadata_path) {
            Ok(content) => content,
            Err(_) => return,
        };

        match serde_json::from_str::<Vec<BackupRecord>>(&content) {
            Ok(records) => {
                let mut map = self.records.write();
                for record in records {
                    if record.local_storage_path.exists() {
                        map.insert(record.id.clone(), record);
                    } else {
                        log::debug!("Dropping backup {}: blob missing", record.id);
                    }
                }
                log::info!("Loaded {} backup record(s) from {}", map.len(), self.dir.display());
            }
            Err(e) => log::warn!("Ignoring unreadable backup metadata: {}", e),
        }
    }

    /// Save metadata to disk
    fn save_metadata(&self) {
        let metadata_path = self.dir.join(METADATA_FILE);
        let records = self.list();

        match serde_json::to_string_pretty(&records) {
            Ok(json) => {
                if let Err(e) = fs::write(&metadata_path, json) {
                    log::warn!("Failed to write backup metadata: {}", e);
                }
            }
            Err(e) => log::warn!("Failed to serialize backup metadata: {}", e),
        }
    }
}

fn push_error(record: &BackupRecord, error: ShellError) -> IntegrityError {
    log::warn!(
        "Push to {} failed, backup {} kept: {}",
        record.original_path,
        record.id,
        error
    );
    IntegrityError::PushFailed {
        path: record.original_path.clone(),
        backup_id: record.id.clone(),
        reason: error.to_string(),
    }
}

// ============================================================================
// TESTS
// ============================================================================
