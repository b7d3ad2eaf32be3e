//! Scoring Rules
//!
//! Every category score is produced by the same evaluator over
//! `{check, deduction}` pairs. The tables below are the only place where
//! deduction amounts live.

use crate::logic::detection::{Category, DetectionResult, RiskLabel};
use crate::logic::integrity::IntegritySummary;

use super::types::{AssessmentCategory, ScoringRule};

// ============================================================================
// DEDUCTION TABLES
// ============================================================================

/// (scoring category, detection category, deduction when detected)
pub const DETECTION_DEDUCTIONS: &[(AssessmentCategory, Category, f64)] = &[
    (AssessmentCategory::Device, Category::Root, 60.0),
    (AssessmentCategory::Environment, Category::Emulator, 50.0),
    (AssessmentCategory::Environment, Category::Debug, 40.0),
    (AssessmentCategory::Application, Category::Application, 60.0),
    (AssessmentCategory::Network, Category::Network, 50.0),
];

/// Deduction per observed modification of a watched file
pub const INTEGRITY_CHANGE_DEDUCTION: f64 = 25.0;

/// Deduction per watched file that could not be found
pub const INTEGRITY_MISSING_DEDUCTION: f64 = 10.0;

// ============================================================================
// EVALUATOR
// ============================================================================

/// `100 − Σ deduction of failed checks`, clamped to [0, 100]
pub fn evaluate_rules(rules: &[ScoringRule]) -> f64 {
    let deducted: f64 = rules
        .iter()
        .filter(|r| r.failed)
        .map(|r| r.deduction.max(0.0))
        .sum();
    (100.0 - deducted).clamp(0.0, 100.0)
}

/// Scoring category a detection category feeds
pub fn scoring_category_for(category: Category) -> AssessmentCategory {
    DETECTION_DEDUCTIONS
        .iter()
        .find(|(_, c, _)| *c == category)
        .map(|(target, _, _)| *target)
        .unwrap_or(AssessmentCategory::Device)
}

/// Rules for `target` built from whichever detections feed it
pub fn detection_rules(target: AssessmentCategory, detections: &[DetectionResult]) -> Vec<ScoringRule> {
    DETECTION_DEDUCTIONS
        .iter()
        .filter(|(t, _, _)| *t == target)
        .filter_map(|(_, category, deduction)| {
            detections
                .iter()
                .find(|d| d.category == *category)
                .map(|d| ScoringRule::new(format!("{}_not_detected", category), d.detected, *deduction))
        })
        .collect()
}

/// File-integrity rules from a monitor summary
pub fn integrity_rules(summary: &IntegritySummary) -> Vec<ScoringRule> {
    let mut rules: Vec<ScoringRule> = summary
        .changes
        .iter()
        .map(|c| ScoringRule::new(format!("unchanged:{}", c.path), true, INTEGRITY_CHANGE_DEDUCTION))
        .collect();

    rules.extend(
        summary
            .missing
            .iter()
            .map(|path| ScoringRule::new(format!("present:{}", path), true, INTEGRITY_MISSING_DEDUCTION)),
    );

    if rules.is_empty() {
        rules.push(ScoringRule::new("no_changes_observed", false, 0.0));
    }
    rules
}

// ============================================================================
// BANDING & RECOMMENDATIONS
// ============================================================================

/// Complementary banding over `100 − score`
pub fn risk_level_for(overall_score: f64) -> RiskLabel {
    let risk = 100.0 - overall_score;
    if risk >= 40.0 {
        RiskLabel::Critical
    } else if risk >= 30.0 {
        RiskLabel::High
    } else if risk >= 20.0 {
        RiskLabel::Medium
    } else {
        RiskLabel::Low
    }
}

pub fn recommendation_for(category: AssessmentCategory) -> &'static str {
    match category {
        AssessmentCategory::Device => {
            "Device integrity is compromised (root evidence found); do not trust results gathered on this device"
        }
        AssessmentCategory::Application => {
            "Application tampering or hooking frameworks detected; verify the installed build and remove instrumentation"
        }
        AssessmentCategory::Environment => {
            "Execution environment is not production-like (emulator or debugging enabled); repeat on a locked-down physical device"
        }
        AssessmentCategory::FileIntegrity => {
            "Monitored files were modified or are missing; restore them from verified backups and review who changed them"
        }
        AssessmentCategory::Network => {
            "Network interception indicators found (proxy, user CA or VPN); remove them before trusting traffic results"
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
