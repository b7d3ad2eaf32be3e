//! Probes - pluggable evidence sources
//!
//! A probe is one named check against the Device Shell. New evidence sources
//! are added by implementing [`Probe`] and registering it in a [`ProbeSet`];
//! aggregation and scoring never need to change.
//!
//! The default sets below target an Android device reached through an
//! `adb shell`-style channel. Other platforms supply their own sets.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

use super::types::Category;
use crate::logic::shell::{DeviceShell, ShellError, ShellOutput};

// ============================================================================
// PROBE CONTRACT
// ============================================================================

pub trait Probe: Send + Sync {
    fn name(&self) -> &str;

    fn category(&self) -> Category;

    /// Explicit weight in [0, 1]. `None` takes the uniform share `1/N`.
    fn weight(&self) -> Option<f64> {
        None
    }

    /// Returns whether the evidence fired. `Err` means no evidence could be obtained.
    fn run(&self, shell: &dyn DeviceShell, timeout_ms: u64) -> Result<bool, ShellError>;

    /// Identifies what this probe checks. Two probes with equal fingerprints
    /// must always produce the same evidence on the same device.
    fn fingerprint(&self) -> String {
        format!("{}|{:?}", self.name(), self.weight())
    }
}

// ============================================================================
// PREDICATES
// ============================================================================

/// Decides whether a command's output counts as evidence.
///
/// A command that exits non-zero never counts, whatever the predicate.
#[derive(Debug, Clone)]
pub enum Predicate {
    Succeeds,
    NonEmpty,
    Contains(String),
    NotContains(String),
    Equals(String),
    Matches(Regex),
}

impl Predicate {
    pub fn matches(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Predicate::Matches(Regex::new(pattern)?))
    }

    pub fn evaluate(&self, out: &ShellOutput) -> bool {
        if !out.success {
            return false;
        }
        let text = out.output.trim();
        match self {
            Predicate::Succeeds => true,
            Predicate::NonEmpty => !text.is_empty(),
            Predicate::Contains(needle) => text.contains(needle.as_str()),
            Predicate::NotContains(needle) => !text.contains(needle.as_str()),
            Predicate::Equals(expected) => text == expected,
            Predicate::Matches(re) => re.is_match(text),
        }
    }
}

// ============================================================================
// COMMAND PROBE
// ============================================================================

/// `{name, command, predicate}` probe
#[derive(Debug, Clone)]
pub struct CommandProbe {
    name: String,
    category: Category,
    command: String,
    predicate: Predicate,
    weight: Option<f64>,
}

impl CommandProbe {
    pub fn new(name: &str, category: Category, command: &str, predicate: Predicate) -> Self {
        Self {
            name: name.to_string(),
            category,
            command: command.to_string(),
            predicate,
            weight: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight.clamp(0.0, 1.0));
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl Probe for CommandProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> Category {
        self.category
    }

    fn weight(&self) -> Option<f64> {
        self.weight
    }

    fn run(&self, shell: &dyn DeviceShell, timeout_ms: u64) -> Result<bool, ShellError> {
        let out = shell.execute(&self.command, timeout_ms)?;
        Ok(self.predicate.evaluate(&out))
    }

    fn fingerprint(&self) -> String {
        format!("{}|{}|{:?}|{:?}", self.name, self.command, self.predicate, self.weight)
    }
}

// ============================================================================
// PROBE SET
// ============================================================================

/// Identity of a probe set's evidence, used to key cached verdicts
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProbeSetKey {
    pub category: Category,
    /// SHA-256 over the ordered probe fingerprints
    pub fingerprint: String,
}

/// Ordered probes for one category
#[derive(Clone)]
pub struct ProbeSet {
    category: Category,
    probes: Vec<Arc<dyn Probe>>,
}

impl ProbeSet {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            probes: Vec::new(),
        }
    }

    /// Register a probe. Probes for another category are ignored.
    pub fn with(mut self, probe: impl Probe + 'static) -> Self {
        self.push(Arc::new(probe));
        self
    }

    pub fn push(&mut self, probe: Arc<dyn Probe>) {
        if probe.category() != self.category {
            log::warn!(
                "Probe '{}' ({}) ignored: set collects {}",
                probe.name(),
                probe.category(),
                self.category
            );
            return;
        }
        self.probes.push(probe);
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn probes(&self) -> &[Arc<dyn Probe>] {
        &self.probes
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Sets with the same category and the same probes share a key
    pub fn key(&self) -> ProbeSetKey {
        let mut hasher = Sha256::new();
        for probe in &self.probes {
            hasher.update(probe.fingerprint().as_bytes());
            hasher.update([0u8]);
        }
        ProbeSetKey {
            category: self.category,
            fingerprint: hex::encode(hasher.finalize()),
        }
    }
}

impl std::fmt::Debug for ProbeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.probes.iter().map(|p| p.name()).collect();
        f.debug_struct("ProbeSet")
            .field("category", &self.category)
            .field("probes", &names)
            .finish()
    }
}

// ============================================================================
// DEFAULT SETS (Android)
// ============================================================================

const ROOT_PACKAGES: &str =
    r"com\.topjohnwu\.magisk|eu\.chainfire\.supersu|com\.koushikdutta\.superuser|com\.noshufou\.android\.su|com\.kingroot\.kinguser";
const SYSTEM_RW_MOUNT: &str = r"(?m)^\S+\s+(on\s+)?/system\s.*\brw\b";
const EMULATOR_MODEL: &str = r"(?i)sdk|emulator|android sdk built for";
const EMULATOR_HARDWARE: &str = r"goldfish|ranchu|vbox86";
const HOOKING_PACKAGES: &str = r"de\.robv\.android\.xposed|org\.lsposed|com\.saurik\.substrate|re\.frida";
const PROXY_SETTING: &str = r"^[^\s:]+:\d+$";
const TRACER_ATTACHED: &str = r"TracerPid:\s*[1-9]";

/// Built-in sets, compiled once on first use
static DEFAULT_PROBE_SETS: Lazy<Result<BTreeMap<Category, ProbeSet>, regex::Error>> = Lazy::new(|| {
    Category::ALL
        .iter()
        .map(|c| build_probe_set(*c).map(|set| (*c, set)))
        .collect()
});

/// Default probe set for `category`
pub fn default_probe_set(category: Category) -> Result<ProbeSet, regex::Error> {
    match &*DEFAULT_PROBE_SETS {
        Ok(sets) => Ok(sets
            .get(&category)
            .cloned()
            .unwrap_or_else(|| ProbeSet::new(category))),
        Err(e) => Err(e.clone()),
    }
}

fn build_probe_set(category: Category) -> Result<ProbeSet, regex::Error> {
    let c = category;
    let set = ProbeSet::new(c);
    let set = match category {
        Category::Root => set
            .with(CommandProbe::new("su_binary", c, "which su", Predicate::NonEmpty))
            .with(CommandProbe::new("root_apps", c, "pm list packages", Predicate::matches(ROOT_PACKAGES)?))
            .with(CommandProbe::new("system_writable", c, "mount", Predicate::matches(SYSTEM_RW_MOUNT)?))
            .with(CommandProbe::new("dangerous_props", c, "getprop ro.secure", Predicate::Equals("0".into()))),
        Category::Emulator => set
            .with(CommandProbe::new("qemu_props", c, "getprop ro.kernel.qemu", Predicate::Equals("1".into())))
            .with(CommandProbe::new("generic_build", c, "getprop ro.product.model", Predicate::matches(EMULATOR_MODEL)?))
            .with(CommandProbe::new("goldfish_hardware", c, "getprop ro.hardware", Predicate::matches(EMULATOR_HARDWARE)?))
            .with(CommandProbe::new(
                "emulator_files",
                c,
                "ls /dev/qemu_pipe /dev/socket/qemud 2>/dev/null; true",
                Predicate::NonEmpty,
            )),
        Category::Debug => set
            .with(CommandProbe::new("adb_enabled", c, "settings get global adb_enabled", Predicate::Equals("1".into())))
            .with(CommandProbe::new("debuggable_build", c, "getprop ro.debuggable", Predicate::Equals("1".into())))
            .with(CommandProbe::new(
                "developer_options",
                c,
                "settings get global development_settings_enabled",
                Predicate::Equals("1".into()),
            ))
            .with(CommandProbe::new("tracer_attached", c, "grep TracerPid /proc/self/status", Predicate::matches(TRACER_ATTACHED)?)),
        Category::Network => set
            .with(CommandProbe::new("http_proxy", c, "settings get global http_proxy", Predicate::matches(PROXY_SETTING)?))
            .with(CommandProbe::new(
                "user_ca_installed",
                c,
                "ls /data/misc/user/0/cacerts-added 2>/dev/null; true",
                Predicate::NonEmpty,
            ))
            .with(CommandProbe::new("vpn_active", c, "ip link show | grep -E 'tun[0-9]|ppp[0-9]'", Predicate::NonEmpty)),
        Category::Application => set
            .with(CommandProbe::new("hooking_framework", c, "pm list packages", Predicate::matches(HOOKING_PACKAGES)?))
            .with(CommandProbe::new("frida_server", c, "ps -A | grep frida-server", Predicate::NonEmpty)),
    };
    Ok(set)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::shell::mock::MockShell;

    #[test]
    fn test_predicates_require_success() {
        let failed = ShellOutput::failed("boom");
        assert!(!Predicate::Succeeds.evaluate(&failed));
        assert!(!Predicate::NotContains("x".into()).evaluate(&failed));

        let ok = ShellOutput::ok("  /system/xbin/su \n");
        assert!(Predicate::NonEmpty.evaluate(&ok));
        assert!(Predicate::Equals("/system/xbin/su".into()).evaluate(&ok));
        assert!(Predicate::Contains("xbin".into()).evaluate(&ok));
        assert!(!Predicate::NotContains("xbin".into()).evaluate(&ok));
    }

    #[test]
    fn test_system_rw_pattern() {
        let p = Predicate::matches(SYSTEM_RW_MOUNT).unwrap();
        let rw = ShellOutput::ok("/dev/block/dm-0 on /system type ext4 (rw,seclabel,relatime)");
        let ro = ShellOutput::ok("/dev/block/dm-0 on /system type ext4 (ro,seclabel,relatime)");
        assert!(p.evaluate(&rw));
        assert!(!p.evaluate(&ro));
    }

    #[test]
    fn test_command_probe_runs_against_shell() {
        let shell = MockShell::new();
        shell.respond("which su", ShellOutput::ok("/sbin/su"));

        let probe = CommandProbe::new("su_binary", Category::Root, "which su", Predicate::NonEmpty);
        assert_eq!(probe.run(&shell, 1_000), Ok(true));

        let missing = CommandProbe::new("busybox", Category::Root, "which busybox", Predicate::NonEmpty);
        assert_eq!(missing.run(&shell, 1_000), Ok(false));
    }

    #[test]
    fn test_probe_set_rejects_foreign_category() {
        let set = ProbeSet::new(Category::Root)
            .with(CommandProbe::new("su_binary", Category::Root, "which su", Predicate::NonEmpty))
            .with(CommandProbe::new("adb", Category::Debug, "x", Predicate::Succeeds));
        assert_eq!(set.len(), 1);
        assert_eq!(set.probes()[0].name(), "su_binary");
    }

    #[test]
    fn test_default_sets_compile_for_every_category() {
        for category in Category::ALL {
            let set = default_probe_set(category).unwrap();
            assert!(!set.is_empty());
            assert!(set.probes().iter().all(|p| p.category() == category));
        }

        let root = default_probe_set(Category::Root).unwrap();
        let names: Vec<&str> = root.probes().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["su_binary", "root_apps", "system_writable", "dangerous_props"]);
    }

    #[test]
    fn test_key_follows_probe_contents() {
        let frida = |command: &str| {
            ProbeSet::new(Category::Application).with(CommandProbe::new(
                "frida",
                Category::Application,
                command,
                Predicate::Contains("frida".into()),
            ))
        };

        let default_app = default_probe_set(Category::Application).unwrap();
        assert_eq!(default_app.key(), default_probe_set(Category::Application).unwrap().key());
        assert_ne!(frida("cat /proc/net/unix").key(), default_app.key());
        assert_ne!(frida("cat /proc/net/unix").key(), frida("ps -A").key());
        assert_eq!(frida("ps -A").key(), frida("ps -A").key());
        assert_eq!(frida("ps -A").key().category, Category::Application);
    }
}
