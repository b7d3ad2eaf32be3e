//! Scoring Types
//!
//! Core types for the risk assessment. No logic beyond small lookups.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::detection::RiskLabel;

// ============================================================================
// ASSESSMENT CATEGORY
// ============================================================================

/// Top-level scoring category. Declaration order is the canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentCategory {
    Device,
    Application,
    Environment,
    FileIntegrity,
    Network,
}

impl AssessmentCategory {
    pub const ALL: [AssessmentCategory; 5] = [
        AssessmentCategory::Device,
        AssessmentCategory::Application,
        AssessmentCategory::Environment,
        AssessmentCategory::FileIntegrity,
        AssessmentCategory::Network,
    ];

    /// Canonical weight (all five sum to 1.0)
    pub fn weight(&self) -> f64 {
        match self {
            AssessmentCategory::Device => 0.40,
            AssessmentCategory::Application => 0.25,
            AssessmentCategory::Environment => 0.20,
            AssessmentCategory::FileIntegrity => 0.10,
            AssessmentCategory::Network => 0.05,
        }
    }

    /// Minimum score for this category to count as passing on its own
    pub fn pass_bar(&self) -> f64 {
        match self {
            AssessmentCategory::Device => 80.0,
            AssessmentCategory::Application => 75.0,
            AssessmentCategory::Environment => 70.0,
            AssessmentCategory::FileIntegrity => 90.0,
            AssessmentCategory::Network => 70.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentCategory::Device => "device",
            AssessmentCategory::Application => "application",
            AssessmentCategory::Environment => "environment",
            AssessmentCategory::FileIntegrity => "file_integrity",
            AssessmentCategory::Network => "network",
        }
    }
}

impl std::fmt::Display for AssessmentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// SECURITY LEVEL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    Critical,
    Poor,
    Acceptable,
    Good,
    Excellent,
}

impl SecurityLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            SecurityLevel::Excellent
        } else if score >= 80.0 {
            SecurityLevel::Good
        } else if score >= 70.0 {
            SecurityLevel::Acceptable
        } else if score >= 60.0 {
            SecurityLevel::Poor
        } else {
            SecurityLevel::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityLevel::Excellent => "excellent",
            SecurityLevel::Good => "good",
            SecurityLevel::Acceptable => "acceptable",
            SecurityLevel::Poor => "poor",
            SecurityLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// INPUTS
// ============================================================================

/// One `{check, deduction}` scoring rule after evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRule {
    pub check: String,
    pub failed: bool,
    pub deduction: f64,
}

impl ScoringRule {
    pub fn new(check: impl Into<String>, failed: bool, deduction: f64) -> Self {
        Self {
            check: check.into(),
            failed,
            deduction,
        }
    }
}

/// What the assessor receives for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CategoryInput {
    /// Pre-computed score in [0, 100]
    Score { score: f64 },
    /// Rules to evaluate with the shared deduction evaluator
    Rules { rules: Vec<ScoringRule> },
    /// Collection faulted; excluded from the weighted sum
    Unevaluated { reason: String },
}

impl CategoryInput {
    pub fn score(score: f64) -> Self {
        CategoryInput::Score { score }
    }

    pub fn rules(rules: Vec<ScoringRule>) -> Self {
        CategoryInput::Rules { rules }
    }

    pub fn unevaluated(reason: impl Into<String>) -> Self {
        CategoryInput::Unevaluated {
            reason: reason.into(),
        }
    }
}

/// Inputs for one `assess()` call. Categories never set count as not collected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssessmentInputs {
    pub categories: BTreeMap<AssessmentCategory, CategoryInput>,
}

impl AssessmentInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, category: AssessmentCategory, input: CategoryInput) -> Self {
        self.set(category, input);
        self
    }

    pub fn set(&mut self, category: AssessmentCategory, input: CategoryInput) {
        self.categories.insert(category, input);
    }

    pub fn get(&self, category: AssessmentCategory) -> Option<&CategoryInput> {
        self.categories.get(&category)
    }
}

// ============================================================================
// OUTPUTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: AssessmentCategory,
    /// In [0, 100]; 0 when not evaluated
    pub score: f64,
    pub weight: f64,
    pub evaluated: bool,
    /// Why the category was excluded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl CategoryScore {
    pub fn passed(&self) -> bool {
        self.evaluated && self.score >= self.category.pass_bar()
    }
}

/// Immutable result of one `assess()` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentReport {
    pub timestamp: DateTime<Utc>,
    pub category_scores: Vec<CategoryScore>,
    pub overall_score: f64,
    pub security_level: SecurityLevel,
    pub risk_level: RiskLabel,
    pub passed: bool,
    pub recommendations: Vec<String>,
}

impl AssessmentReport {
    pub fn category(&self, category: AssessmentCategory) -> Option<&CategoryScore> {
        self.category_scores.iter().find(|s| s.category == category)
    }

    pub fn evaluated_count(&self) -> usize {
        self.category_scores.iter().filter(|s| s.evaluated).count()
    }
}
