//! Detection Thresholds & Risk Mapping
//!
//! Constants and config only. No aggregation logic here.

use serde::{Deserialize, Serialize};

use super::types::{Category, RiskLabel};

// ============================================================================
// THRESHOLDS (Defaults)
// ============================================================================

/// Root hiding suppresses observable evidence, so a lower bar applies
pub const ROOT_THRESHOLD: f64 = 0.3;

pub const EMULATOR_THRESHOLD: f64 = 0.5;

pub const DEBUG_THRESHOLD: f64 = 0.5;

/// Any category without a dedicated threshold
pub const DEFAULT_THRESHOLD: f64 = 0.5;

// ============================================================================
// CONFIGURABLE THRESHOLDS
// ============================================================================

/// Per-category decision thresholds. A category is detected when its
/// confidence is strictly greater than its threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionThresholds {
    pub root: f64,
    pub emulator: f64,
    pub debug: f64,
    pub default: f64,
}

impl Default for DetectionThresholds {
    fn default() -> Self {
        Self {
            root: ROOT_THRESHOLD,
            emulator: EMULATOR_THRESHOLD,
            debug: DEBUG_THRESHOLD,
            default: DEFAULT_THRESHOLD,
        }
    }
}

impl DetectionThresholds {
    /// Lower bars, more verdicts
    pub fn strict() -> Self {
        Self {
            root: 0.2,
            emulator: 0.35,
            debug: 0.35,
            default: 0.35,
        }
    }

    /// Higher bars, fewer verdicts
    pub fn lenient() -> Self {
        Self {
            root: 0.5,
            emulator: 0.65,
            debug: 0.65,
            default: 0.65,
        }
    }

    pub fn threshold_for(&self, category: Category) -> f64 {
        match category {
            Category::Root => self.root,
            Category::Emulator => self.emulator,
            Category::Debug => self.debug,
            Category::Network | Category::Application => self.default,
        }
    }
}

/// Risk label attached to a positive verdict for `category`
pub fn risk_label_for(category: Category) -> RiskLabel {
    match category {
        Category::Root => RiskLabel::Critical,
        Category::Emulator => RiskLabel::High,
        Category::Debug => RiskLabel::Medium,
        Category::Network | Category::Application => RiskLabel::Low,
    }
}

// ============================================================================
// TESTS
// ============================================================================
