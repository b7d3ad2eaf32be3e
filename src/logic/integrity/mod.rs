//! Integrity Module
//!
//! Baselines, verified backups, structured config edits and change
//! monitoring for files on the assessed device.
//!
//! ## Structure
//! - `types`: FileBaseline, BackupRecord, IntegrityChange, MonitorOutcome, IntegrityError
//! - `checksum`: remote digests, local SHA-256
//! - `config_edit`: key=value, JSON and XML edits
//! - `backup`: BackupStore (verified restore, path locks, JSON metadata)
//! - `watch`: MonitorSession, CancelToken, SessionRegistry

pub mod types;
pub mod checksum;
pub mod config_edit;
pub mod backup;
pub mod watch;

pub use types::{
    BackupRecord, BaselineCapture, BaselineFault, FileBaseline, IntegrityChange, IntegrityError,
    IntegritySummary, ModifyOutcome, MonitorOutcome,
};
pub use config_edit::{apply_edit, ConfigEdit, ConfigEditError, ConfigFormat};
pub use backup::{BackupStore, PathLock};
pub use watch::{CancelToken, MonitorSession, SessionRegistry};

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use checksum::{remote_checksum, Observation};
use crate::logic::shell::ShellHandle;

// ============================================================================
// INTEGRITY MONITOR
// ============================================================================

#[derive(Clone)]
pub struct IntegrityMonitor {
    shell: ShellHandle,
    store: BackupStore,
    sessions: Arc<SessionRegistry>,
    /// Last known checksum per path, shared by baselines and monitor sessions
    baselines: Arc<RwLock<HashMap<String, Option<String>>>>,
    checksum_command: String,
    poll_interval: Duration,
}

impl IntegrityMonitor {
    pub fn new(
        shell: ShellHandle,
        store: BackupStore,
        checksum_command: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            shell,
            store,
            sessions: Arc::new(SessionRegistry::new()),
            baselines: Arc::new(RwLock::new(HashMap::new())),
            checksum_command: checksum_command.into(),
            poll_interval,
        }
    }

    pub fn store(&self) -> &BackupStore {
        &self.store
    }

    /// Checksum every path. Missing or unreadable files are recorded per path;
    /// only a dead channel stops the batch.
    pub async fn capture_baseline(&self, paths: &[String]) -> BaselineCapture {
        let mut capture = BaselineCapture::default();

        for path in paths {
            let entry = match remote_checksum(&self.shell, &self.checksum_command, path).await {
                Ok(Observation::Present(checksum)) => Ok(FileBaseline {
                    path: path.clone(),
                    checksum,
                    captured_at: Utc::now(),
                }),
                Ok(Observation::Missing) => Err(BaselineFault::Missing),
                Ok(Observation::Unreadable(reason)) => Err(BaselineFault::Unreadable(reason)),
                Err(e) if e.is_unreachable() => {
                    log::warn!("Baseline capture stopped at {}: {}", path, e);
                    capture.unreachable = Some(e.to_string());
                    break;
                }
                Err(e) => Err(BaselineFault::Unreadable(e.to_string())),
            };

            match &entry {
                Ok(baseline) => {
                    self.baselines
                        .write()
                        .insert(path.clone(), Some(baseline.checksum.clone()));
                }
                Err(BaselineFault::Missing) => {
                    self.baselines.write().insert(path.clone(), None);
                }
                Err(BaselineFault::Unreadable(reason)) => {
                    log::debug!("No baseline for {}: {}", path, reason);
                }
            }
            capture.entries.insert(path.clone(), entry);
        }

        log::info!(
            "Captured baseline for {}/{} path(s)",
            capture.entries.values().filter(|e| e.is_ok()).count(),
            paths.len()
        );
        capture
    }

    pub async fn create_backup(&self, path: &str) -> Result<BackupRecord, IntegrityError> {
        self.store.create_backup(&self.shell, path).await
    }

    pub async fn restore_from_backup(&self, backup_id: &str) -> Result<(), IntegrityError> {
        self.store.restore(&self.shell, backup_id).await
    }

    /// Back up `path`, apply one key edit to its content and push it back.
    ///
    /// Once the backup exists every later failure reports its id, and the
    /// backup is left in the store.
    pub async fn modify_config(
        &self,
        path: &str,
        key: &str,
        value: &str,
        format: ConfigFormat,
    ) -> Result<ModifyOutcome, IntegrityError> {
        let _lock = self.store.lock_path(path).await;

        let record = self.store.create_backup_unlocked(&self.shell, path).await?;
        let format_error = |source: ConfigEditError| IntegrityError::ConfigFormat {
            backup_id: record.id.clone(),
            source,
        };

        let bytes = self.store.read_verified(&record)?;
        let content = String::from_utf8(bytes)
            .map_err(|e| format_error(ConfigEditError::Malformed(format!("not UTF-8 text: {}", e))))?;
        let edit = apply_edit(&content, key, value, format).map_err(format_error)?;

        let staged = self.store.stage(&record.id, edit.content.as_bytes())?;
        let pushed = self.shell.push_file(&staged, path).await;
        let _ = fs::remove_file(&staged);

        if let Err(e) = pushed {
            log::warn!("Config push to {} failed, backup {} kept: {}", path, record.id, e);
            return Err(IntegrityError::PushFailed {
                path: path.to_string(),
                backup_id: record.id.clone(),
                reason: e.to_string(),
            });
        }

        log::info!("Set {} in {} ({}, backup {})", key, path, format, record.id);
        Ok(ModifyOutcome {
            backup_id: record.id.clone(),
            original_value: edit.original_value,
        })
    }

    /// Watch `paths` for `duration`. See [`MonitorSession::run`].
    pub async fn monitor(
        &self,
        paths: &[String],
        duration: Duration,
        cancel: CancelToken,
    ) -> Result<MonitorOutcome, IntegrityError> {
        self.run_session(paths, duration, cancel, None).await
    }

    /// `monitor`, also streaming each change as it is observed
    pub async fn monitor_with_events(
        &self,
        paths: &[String],
        duration: Duration,
        cancel: CancelToken,
        events: mpsc::UnboundedSender<IntegrityChange>,
    ) -> Result<MonitorOutcome, IntegrityError> {
        self.run_session(paths, duration, cancel, Some(events)).await
    }

    pub fn cleanup(&self) -> Result<usize, IntegrityError> {
        self.store.cleanup()
    }

    pub fn backups(&self) -> Vec<BackupRecord> {
        self.store.list()
    }

    async fn run_session(
        &self,
        paths: &[String],
        duration: Duration,
        cancel: CancelToken,
        events: Option<mpsc::UnboundedSender<IntegrityChange>>,
    ) -> Result<MonitorOutcome, IntegrityError> {
        let _claim = self.sessions.claim(paths)?;

        let seed: HashMap<String, Option<String>> = {
            let baselines = self.baselines.read();
            paths
                .iter()
                .filter_map(|p| baselines.get(p).map(|c| (p.clone(), c.clone())))
                .collect()
        };

        let mut session = MonitorSession::new(
            paths.to_vec(),
            seed,
            cancel,
            self.checksum_command.clone(),
            self.poll_interval,
        );
        let outcome = session.run(&self.shell, duration, events).await;

        self.baselines.write().extend(
            session
                .baseline()
                .iter()
                .map(|(path, checksum)| (path.clone(), checksum.clone())),
        );
        Ok(outcome)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::shell::mock::{MockShell, SUM_C0, SUM_C1};

    const POLL: Duration = Duration::from_millis(10);

    fn setup() -> (tempfile::TempDir, Arc<MockShell>, IntegrityMonitor) {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockShell::new());
        let shell = ShellHandle::new(mock.clone(), 1_000);
        let store = BackupStore::open(dir.path()).unwrap();
        let monitor = IntegrityMonitor::new(shell, store, "sha256sum {path}", POLL);
        (dir, mock, monitor)
    }

    fn paths(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    #[tokio::test]
    async fn test_capture_baseline_records_missing_without_aborting() {
        let (_dir, mock, monitor) = setup();
        mock.put_file("/data/a.cfg", b"a");
        mock.put_file("/data/c.cfg", b"c");

        let capture = monitor
            .capture_baseline(&paths(&["/data/a.cfg", "/data/b.cfg", "/data/c.cfg"]))
            .await;

        assert!(capture.is_complete());
        assert_eq!(capture.entries.len(), 3);
        assert_eq!(capture.checksum("/data/a.cfg"), Some(checksum::checksum_bytes(b"a").as_str()));
        assert_eq!(capture.missing(), vec!["/data/b.cfg".to_string()]);
        assert!(capture.checksum("/data/c.cfg").is_some());
    }

    #[tokio::test]
    async fn test_capture_baseline_stops_on_unreachable() {
        let (_dir, mock, monitor) = setup();
        mock.put_file("/data/a.cfg", b"a");
        mock.put_file("/data/b.cfg", b"b");
        mock.unreachable_after(1);

        let capture = monitor.capture_baseline(&paths(&["/data/a.cfg", "/data/b.cfg"])).await;
        assert!(!capture.is_complete());
        assert_eq!(capture.entries.len(), 1);
    }

    #[tokio::test]
    async fn test_modify_config_key_value() {
        let (_dir, mock, monitor) = setup();
        mock.put_file("/data/app.properties", b"debug=false\nlevel=info\n");

        let outcome = monitor
            .modify_config("/data/app.properties", "debug", "true", ConfigFormat::KeyValue)
            .await
            .unwrap();

        assert_eq!(outcome.original_value.as_deref(), Some("false"));
        assert_eq!(mock.file("/data/app.properties").unwrap(), b"debug=true\nlevel=info\n");

        // Backup still holds the original and restores it
        monitor.restore_from_backup(&outcome.backup_id).await.unwrap();
        assert_eq!(mock.file("/data/app.properties").unwrap(), b"debug=false\nlevel=info\n");
    }

    #[tokio::test]
    async fn test_modify_config_format_error_keeps_backup() {
        let (_dir, mock, monitor) = setup();
        mock.put_file("/data/app.json", b"{broken");

        let err = monitor
            .modify_config("/data/app.json", "a.b", "1", ConfigFormat::Json)
            .await
            .unwrap_err();

        let backup_id = match err {
            IntegrityError::ConfigFormat { backup_id, source } => {
                assert!(matches!(source, ConfigEditError::Malformed(_)));
                backup_id
            }
            other => panic!("unexpected error: {other}"),
        };
        assert!(monitor.store().get(&backup_id).is_some());
        assert_eq!(mock.push_count(), 0);
        assert_eq!(mock.file("/data/app.json").unwrap(), b"{broken");
    }

    #[tokio::test]
    async fn test_modify_config_push_failure_keeps_backup() {
        let (_dir, mock, monitor) = setup();
        mock.put_file("/data/prefs.xml", b"<map><string name=\"host\">a</string></map>");
        mock.set_fail_push(true);

        let err = monitor
            .modify_config("/data/prefs.xml", "host", "b", ConfigFormat::Xml)
            .await
            .unwrap_err();
        let backup_id = match err {
            IntegrityError::PushFailed { backup_id, .. } => backup_id,
            other => panic!("unexpected error: {other}"),
        };
        assert!(monitor.store().get(&backup_id).is_some());
        assert_eq!(monitor.backups().len(), 1);
    }

    #[tokio::test]
    async fn test_monitor_uses_captured_baseline() {
        let (_dir, mock, monitor) = setup();
        mock.script_checksums("/data/p", vec![Some(SUM_C0), Some(SUM_C1), Some(SUM_C0)]);

        monitor.capture_baseline(&paths(&["/data/p"])).await;
        let outcome = monitor
            .monitor(&paths(&["/data/p"]), Duration::from_millis(300), CancelToken::new())
            .await
            .unwrap();

        assert!(outcome.completed);
        let pairs: Vec<(Option<String>, Option<String>)> = outcome
            .changes
            .iter()
            .map(|c| (c.previous_checksum.clone(), c.current_checksum.clone()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (Some(SUM_C0.to_string()), Some(SUM_C1.to_string())),
                (Some(SUM_C1.to_string()), Some(SUM_C0.to_string())),
            ]
        );
        assert!(outcome.summary().fault.is_none());
    }

    #[tokio::test]
    async fn test_overlapping_monitor_rejected() {
        let (_dir, mock, monitor) = setup();
        mock.put_file("/data/p", b"x");

        let cancel = CancelToken::new();
        let background = monitor.clone();
        let first_cancel = cancel.clone();
        let first = tokio::spawn(async move {
            background
                .monitor(&["/data/p".to_string()], Duration::from_secs(10), first_cancel)
                .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = monitor
            .monitor(&paths(&["/data/p", "/data/q"]), Duration::from_millis(10), CancelToken::new())
            .await;
        assert!(matches!(second, Err(IntegrityError::SessionConflict { .. })));

        cancel.cancel();
        let first = first.await.unwrap().unwrap();
        assert!(first.cancelled);

        // Released after the first session resolved
        assert!(monitor
            .monitor(&paths(&["/data/p"]), Duration::from_millis(10), CancelToken::new())
            .await
            .is_ok());
    }
}
