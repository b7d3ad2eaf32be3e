//! Assessment Engine - public entry point
//!
//! One engine per assessed device. Owns the bounded shell handle, the
//! evidence cache, the registered probe sets and the integrity monitor.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::logic::cache::ResultCache;
use crate::logic::config::EngineConfig;
use crate::logic::detection::{
    self, default_probe_set, Category, DetectionError, DetectionResult, DetectionThresholds, ProbeSet,
    ProbeSetKey,
};
use crate::logic::integrity::{
    BackupRecord, BackupStore, BaselineCapture, CancelToken, ConfigFormat, IntegrityChange,
    IntegrityError, IntegrityMonitor, IntegritySummary, ModifyOutcome, MonitorOutcome,
};
use crate::logic::scoring::{self, AssessmentInputs, AssessmentReport};
use crate::logic::shell::{DeviceShell, ShellHandle};

/// Verdicts keyed by the probe set that produced them, so a custom set never
/// reads a verdict computed from another set of the same category
pub type DetectionCache = ResultCache<ProbeSetKey, DetectionResult>;

pub struct AssessmentEngine {
    shell: ShellHandle,
    cache: Arc<DetectionCache>,
    probe_sets: BTreeMap<Category, ProbeSet>,
    integrity: IntegrityMonitor,
    config: EngineConfig,
}

impl AssessmentEngine {
    /// Build an engine around `shell`. Opens the backup store in `config.backup_dir`.
    pub fn new(shell: Arc<dyn DeviceShell>, config: EngineConfig) -> Result<Self, IntegrityError> {
        let shell = ShellHandle::new(shell, config.shell_timeout_ms);
        let store = BackupStore::open(&config.backup_dir)?;
        let integrity = IntegrityMonitor::new(
            shell.clone(),
            store,
            config.checksum_command.clone(),
            config.poll_interval(),
        );

        log::info!(
            "Assessment engine ready (shell timeout {}ms, cache ttl {}s, backups in {})",
            config.shell_timeout_ms,
            config.cache_ttl_secs,
            config.backup_dir.display()
        );

        Ok(Self {
            shell,
            cache: Arc::new(ResultCache::new(config.cache_ttl())),
            probe_sets: BTreeMap::new(),
            integrity,
            config,
        })
    }

    /// Share an externally owned cache (e.g. across engines for one device)
    pub fn with_cache(mut self, cache: Arc<DetectionCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Register the built-in Android probe set for every category
    pub fn with_default_probes(mut self) -> Result<Self, regex::Error> {
        for category in Category::ALL {
            self.register_probe_set(default_probe_set(category)?);
        }
        Ok(self)
    }

    /// Replace the probe set used for its category
    pub fn register_probe_set(&mut self, set: ProbeSet) {
        if let Some(previous) = self.probe_sets.insert(set.category(), set) {
            self.cache.invalidate(&previous.key());
        }
    }

    pub fn probe_set(&self, category: Category) -> Option<&ProbeSet> {
        self.probe_sets.get(&category)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &DetectionCache {
        &self.cache
    }

    pub fn integrity(&self) -> &IntegrityMonitor {
        &self.integrity
    }

    // ------------------------------------------------------------------------
    // detection
    // ------------------------------------------------------------------------

    /// Verdict for one category, served from the cache while it is fresh
    pub async fn detect_category(&self, set: &ProbeSet) -> Result<DetectionResult, DetectionError> {
        detect_cached(&self.shell, &self.cache, set, &self.config.thresholds).await
    }

    /// Every registered category, collected concurrently. Ordered by category.
    pub async fn detect_all(&self) -> Vec<Result<DetectionResult, DetectionError>> {
        let mut tasks = JoinSet::new();

        for set in self.probe_sets.values() {
            let shell = self.shell.clone();
            let cache = Arc::clone(&self.cache);
            let set = set.clone();
            let thresholds = self.config.thresholds.clone();
            tasks.spawn(async move { detect_cached(&shell, &cache, &set, &thresholds).await });
        }

        let mut results = Vec::with_capacity(self.probe_sets.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => log::error!("Detection task failed: {}", e),
            }
        }

        results.sort_by_key(|r| match r {
            Ok(d) => d.category,
            Err(e) => e.category(),
        });
        results
    }

    // ------------------------------------------------------------------------
    // scoring
    // ------------------------------------------------------------------------

    pub fn assess(&self, inputs: &AssessmentInputs) -> AssessmentReport {
        scoring::assess(inputs)
    }

    /// Detect every registered category and score the outcome together with
    /// an optional integrity summary
    pub async fn run_assessment(&self, integrity: Option<&IntegritySummary>) -> AssessmentReport {
        let detections = self.detect_all().await;
        let inputs = scoring::inputs_from_detections(&detections, integrity);
        scoring::assess(&inputs)
    }

    // ------------------------------------------------------------------------
    // integrity
    // ------------------------------------------------------------------------

    pub async fn capture_baseline(&self, paths: &[String]) -> BaselineCapture {
        self.integrity.capture_baseline(paths).await
    }

    pub async fn create_backup(&self, path: &str) -> Result<BackupRecord, IntegrityError> {
        self.integrity.create_backup(path).await
    }

    pub async fn restore_from_backup(&self, backup_id: &str) -> Result<(), IntegrityError> {
        self.integrity.restore_from_backup(backup_id).await
    }

    pub async fn modify_config(
        &self,
        path: &str,
        key: &str,
        value: &str,
        format: ConfigFormat,
    ) -> Result<ModifyOutcome, IntegrityError> {
        self.integrity.modify_config(path, key, value, format).await
    }

    pub async fn monitor(
        &self,
        paths: &[String],
        duration: Duration,
        cancel: CancelToken,
    ) -> Result<MonitorOutcome, IntegrityError> {
        self.integrity.monitor(paths, duration, cancel).await
    }

    pub async fn monitor_with_events(
        &self,
        paths: &[String],
        duration: Duration,
        cancel: CancelToken,
        events: mpsc::UnboundedSender<IntegrityChange>,
    ) -> Result<MonitorOutcome, IntegrityError> {
        self.integrity.monitor_with_events(paths, duration, cancel, events).await
    }

    /// Drop cached verdicts and every stored backup
    pub fn cleanup(&self) -> Result<usize, IntegrityError> {
        self.cache.clear();
        self.integrity.cleanup()
    }
}

async fn detect_cached(
    shell: &ShellHandle,
    cache: &DetectionCache,
    set: &ProbeSet,
    thresholds: &DetectionThresholds,
) -> Result<DetectionResult, DetectionError> {
    let key = set.key();
    if let Some(hit) = cache.get(&key) {
        log::debug!("[{}] served from cache", set.category());
        return Ok(hit);
    }

    let result = detection::detect(shell, set, thresholds).await?;
    cache.set(key, result.clone());
    Ok(result)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::detection::{CommandProbe, Predicate};
    use crate::logic::scoring::{AssessmentCategory, SecurityLevel};
    use crate::logic::shell::mock::{MockShell, SUM_C0, SUM_C1};
    use crate::logic::shell::ShellOutput;

    fn engine(mock: Arc<MockShell>, dir: &tempfile::TempDir, cache_ttl_secs: u64) -> AssessmentEngine {
        let config = EngineConfig {
            shell_timeout_ms: 1_000,
            poll_interval_ms: 10,
            cache_ttl_secs,
            backup_dir: dir.path().join("backups"),
            ..EngineConfig::default()
        };
        AssessmentEngine::new(mock, config)
            .unwrap()
            .with_default_probes()
            .unwrap()
    }

    #[tokio::test]
    async fn test_detect_category_uses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockShell::new());
        let engine = engine(mock.clone(), &dir, 60);
        let set = engine.probe_set(Category::Root).unwrap().clone();

        let first = engine.detect_category(&set).await.unwrap();
        let calls = mock.call_count();
        let second = engine.detect_category(&set).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(mock.call_count(), calls);
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockShell::new());
        let engine = engine(mock.clone(), &dir, 0);
        let set = engine.probe_set(Category::Debug).unwrap().clone();

        engine.detect_category(&set).await.unwrap();
        let calls = mock.call_count();
        engine.detect_category(&set).await.unwrap();
        assert_eq!(mock.call_count(), calls * 2);
    }

    #[tokio::test]
    async fn test_custom_probe_set() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockShell::new());
        mock.respond("cat /proc/net/unix", ShellOutput::ok("@frida-gadget"));
        let engine = engine(mock, &dir, 0);

        let set = ProbeSet::new(Category::Application).with(CommandProbe::new(
            "frida_socket",
            Category::Application,
            "cat /proc/net/unix",
            Predicate::Contains("frida".to_string()),
        ));
        let result = engine.detect_category(&set).await.unwrap();
        assert!(result.detected);
        assert_eq!(result.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_custom_set_not_served_default_verdict() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockShell::new());
        mock.respond("cat /proc/net/unix", ShellOutput::ok("@frida-gadget"));
        let engine = engine(mock, &dir, 60);

        let default_app = engine.probe_set(Category::Application).unwrap().clone();
        let cached = engine.detect_category(&default_app).await.unwrap();
        assert!(!cached.detected);

        let custom = ProbeSet::new(Category::Application).with(CommandProbe::new(
            "frida_socket",
            Category::Application,
            "cat /proc/net/unix",
            Predicate::Contains("frida".to_string()),
        ));
        let result = engine.detect_category(&custom).await.unwrap();
        assert!(result.detected);
        assert_eq!(result.indicators_total, 1);

        // both verdicts stay cached side by side
        assert_eq!(engine.detect_category(&default_app).await.unwrap(), cached);
        assert_eq!(engine.cache().len(), 2);
    }

    #[tokio::test]
    async fn test_register_probe_set_drops_replaced_verdict() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockShell::new());
        let mut engine = engine(mock, &dir, 60);

        let default_root = engine.probe_set(Category::Root).unwrap().clone();
        engine.detect_category(&default_root).await.unwrap();
        assert!(engine.cache().get(&default_root.key()).is_some());

        engine.register_probe_set(ProbeSet::new(Category::Root).with(CommandProbe::new(
            "su_binary",
            Category::Root,
            "which su",
            Predicate::NonEmpty,
        )));
        assert!(engine.cache().get(&default_root.key()).is_none());
    }

    #[tokio::test]
    async fn test_run_assessment_clean_device() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(Arc::new(MockShell::new()), &dir, 0);

        let detections = engine.detect_all().await;
        assert_eq!(detections.len(), 5);
        assert!(detections.iter().all(|d| matches!(d, Ok(r) if !r.detected)));

        let report = engine.run_assessment(None).await;
        assert_eq!(report.overall_score, 100.0);
        assert_eq!(report.security_level, SecurityLevel::Excellent);
        assert!(!report.category(AssessmentCategory::FileIntegrity).unwrap().evaluated);
    }

    #[tokio::test]
    async fn test_run_assessment_rooted_device() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockShell::new());
        mock.respond("which su", ShellOutput::ok("/system/xbin/su"));
        mock.respond("mount", ShellOutput::ok("/dev/block/dm-0 on /system type ext4 (rw,relatime)"));
        let engine = engine(mock, &dir, 0);

        let report = engine.run_assessment(None).await;
        // device 40 (weight .40) with application, environment, network at 100
        assert_eq!(report.overall_score, 73.33);
        assert!(report.passed);
        assert_eq!(report.category(AssessmentCategory::Device).unwrap().score, 40.0);
        assert!(report.recommendations[0].starts_with("[device]"));
    }

    #[tokio::test]
    async fn test_unreachable_device_reports_critical() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockShell::new());
        mock.set_unreachable(true);
        let engine = engine(mock, &dir, 0);

        let report = engine.run_assessment(None).await;
        assert_eq!(report.evaluated_count(), 0);
        assert_eq!(report.overall_score, 0.0);
        assert!(!report.passed);
    }

    #[tokio::test]
    async fn test_integrity_passthrough_feeds_scoring() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockShell::new());
        mock.script_checksums("/data/app.cfg", vec![Some(SUM_C0), Some(SUM_C1)]);
        let engine = engine(mock, &dir, 0);

        let watched = vec!["/data/app.cfg".to_string()];
        engine.capture_baseline(&watched).await;
        let outcome = engine
            .monitor(&watched, Duration::from_millis(100), CancelToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.changes.len(), 1);

        let report = engine.run_assessment(Some(&outcome.summary())).await;
        let integrity = report.category(AssessmentCategory::FileIntegrity).unwrap();
        assert!(integrity.evaluated);
        assert_eq!(integrity.score, 75.0);
    }
}
