//! Detection Types
//!
//! Data structures only. Collection lives in `collector`, fusion in `aggregator`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// CATEGORY
// ============================================================================

/// Detection domain a probe contributes evidence to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Emulator,
    Root,
    Debug,
    Network,
    Application,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Emulator,
        Category::Root,
        Category::Debug,
        Category::Network,
        Category::Application,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Emulator => "emulator",
            Category::Root => "root",
            Category::Debug => "debug",
            Category::Network => "network",
            Category::Application => "application",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// RISK LABEL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLabel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLabel::Low => "low",
            RiskLabel::Medium => "medium",
            RiskLabel::High => "high",
            RiskLabel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// INDICATOR
// ============================================================================

/// One atomic piece of evidence, produced per probe run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    pub name: String,
    pub category: Category,
    pub detected: bool,
    /// Relative weight in [0, 1]
    pub weight: f64,
    /// Why the probe could not produce evidence (recorded as not detected)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

impl Indicator {
    pub fn new(name: &str, category: Category, detected: bool, weight: f64) -> Self {
        Self {
            name: name.to_string(),
            category,
            detected,
            weight: weight.clamp(0.0, 1.0),
            fault: None,
        }
    }

    pub fn faulted(name: &str, category: Category, weight: f64, fault: impl Into<String>) -> Self {
        Self {
            fault: Some(fault.into()),
            ..Self::new(name, category, false, weight)
        }
    }
}

// ============================================================================
// DETECTION RESULT
// ============================================================================

/// Verdict for one category. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub category: Category,
    pub detected: bool,
    /// Weighted fraction of indicators that fired, in [0, 1]
    pub confidence: f64,
    pub indicators_fired: usize,
    pub indicators_total: usize,
    pub risk_label: RiskLabel,
    pub timestamp: DateTime<Utc>,
    /// Fault notes of probes that degraded to "not detected"
    #[serde(default)]
    pub faults: Vec<String>,
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, Error)]
pub enum DetectionError {
    /// Channel died mid-collection; `partial` holds what was gathered before
    #[error("device unreachable while collecting {category} evidence: {reason}")]
    DeviceUnreachable {
        category: Category,
        partial: Vec<Indicator>,
        reason: String,
    },
}

impl DetectionError {
    pub fn category(&self) -> Category {
        match self {
            DetectionError::DeviceUnreachable { category, .. } => *category,
        }
    }
}
