//! Signal Collector
//!
//! Runs a category's probes in order against the Device Shell. A probe that
//! errors is recorded as "not detected" with a fault note and the batch
//! continues; only a dead channel stops collection.

use std::sync::Arc;

use super::probes::ProbeSet;
use super::types::{Category, Indicator};
use crate::logic::shell::ShellHandle;

/// Outcome of one collection pass
#[derive(Debug, Clone)]
pub struct Collection {
    pub category: Category,
    pub indicators: Vec<Indicator>,
    /// Set when the channel died; `indicators` then holds a partial batch
    pub unreachable: Option<String>,
}

impl Collection {
    pub fn is_complete(&self) -> bool {
        self.unreachable.is_none()
    }

    pub fn faults(&self) -> Vec<String> {
        self.indicators
            .iter()
            .filter_map(|i| i.fault.as_ref().map(|f| format!("{}: {}", i.name, f)))
            .collect()
    }
}

/// Run every probe of `set` and gather indicators
pub async fn collect(shell: &ShellHandle, set: &ProbeSet) -> Collection {
    let category = set.category();
    let uniform = if set.is_empty() {
        0.0
    } else {
        1.0 / set.len() as f64
    };

    let mut indicators = Vec::with_capacity(set.len());

    for probe in set.probes() {
        let weight = probe.weight().unwrap_or(uniform);
        let name = probe.name().to_string();
        let running = Arc::clone(probe);

        match shell.run(move |sh, timeout_ms| running.run(sh, timeout_ms)).await {
            Ok(detected) => {
                log::debug!("[{}] probe {} -> {}", category, name, detected);
                indicators.push(Indicator::new(&name, category, detected, weight));
            }
            Err(e) if e.is_unreachable() => {
                log::warn!(
                    "[{}] device unreachable at probe {}; stopping after {} indicator(s)",
                    category,
                    name,
                    indicators.len()
                );
                return Collection {
                    category,
                    indicators,
                    unreachable: Some(e.to_string()),
                };
            }
            Err(e) => {
                log::warn!("[{}] probe {} failed, counted as not detected: {}", category, name, e);
                indicators.push(Indicator::faulted(&name, category, weight, e.to_string()));
            }
        }
    }

    Collection {
        category,
        indicators,
        unreachable: None,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::detection::probes::{CommandProbe, Predicate};
    use crate::logic::shell::mock::MockShell;
    use crate::logic::shell::{ShellError, ShellOutput};

    fn root_set() -> ProbeSet {
        let c = Category::Root;
        ProbeSet::new(c)
            .with(CommandProbe::new("su_binary", c, "which su", Predicate::NonEmpty))
            .with(CommandProbe::new("root_apps", c, "pm list packages", Predicate::Contains("magisk".into())))
            .with(CommandProbe::new("system_writable", c, "mount", Predicate::Contains("rw".into())))
            .with(CommandProbe::new("dangerous_props", c, "getprop ro.secure", Predicate::Equals("0".into())))
    }

    #[tokio::test]
    async fn test_collects_in_order_with_uniform_weights() {
        let mock = Arc::new(MockShell::new());
        mock.respond("which su", ShellOutput::ok("/system/xbin/su"));
        let shell = ShellHandle::new(mock, 1_000);

        let collection = collect(&shell, &root_set()).await;
        assert!(collection.is_complete());

        let names: Vec<&str> = collection.indicators.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["su_binary", "root_apps", "system_writable", "dangerous_props"]);
        assert!(collection.indicators[0].detected);
        assert!(collection.indicators[1..].iter().all(|i| !i.detected));
        assert!(collection.indicators.iter().all(|i| i.weight == 0.25));
    }

    #[tokio::test]
    async fn test_failing_probe_is_isolated() {
        let mock = Arc::new(MockShell::new());
        mock.fail_with("pm list packages", ShellError::Io("pm crashed".to_string()));
        mock.respond("mount", ShellOutput::ok("/dev/root on /system type ext4 (rw)"));
        let shell = ShellHandle::new(mock, 1_000);

        let collection = collect(&shell, &root_set()).await;
        assert!(collection.is_complete());
        assert_eq!(collection.indicators.len(), 4);

        let root_apps = &collection.indicators[1];
        assert!(!root_apps.detected);
        assert!(root_apps.fault.as_deref().unwrap().contains("pm crashed"));
        assert!(collection.indicators[2].detected);
        assert_eq!(collection.faults().len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_stops_with_partial_batch() {
        let mock = Arc::new(MockShell::new());
        mock.respond("which su", ShellOutput::ok("/sbin/su"));
        mock.unreachable_after(2);
        let shell = ShellHandle::new(mock, 1_000);

        let collection = collect(&shell, &root_set()).await;
        assert!(!collection.is_complete());
        assert_eq!(collection.indicators.len(), 2);
        assert!(collection.unreachable.unwrap().contains("unreachable"));
    }

    #[tokio::test]
    async fn test_explicit_weight_overrides_uniform() {
        let c = Category::Debug;
        let set = ProbeSet::new(c)
            .with(CommandProbe::new("adb", c, "a", Predicate::Succeeds).with_weight(0.9))
            .with(CommandProbe::new("dev", c, "b", Predicate::Succeeds));
        let shell = ShellHandle::new(Arc::new(MockShell::new()), 1_000);

        let collection = collect(&shell, &set).await;
        assert_eq!(collection.indicators[0].weight, 0.9);
        assert_eq!(collection.indicators[1].weight, 0.5);
    }
}
