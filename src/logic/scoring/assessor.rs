//! Risk Assessor
//!
//! Fuses per-category scores into one report. Weights are renormalized over
//! the categories actually evaluated: a faulted category is dropped from both
//! numerator and denominator instead of being zero- or hundred-filled.

use chrono::Utc;

use super::rules::{detection_rules, evaluate_rules, integrity_rules, recommendation_for, risk_level_for};
use super::types::{
    AssessmentCategory, AssessmentInputs, AssessmentReport, CategoryInput, CategoryScore,
    SecurityLevel,
};
use crate::logic::detection::{DetectionError, DetectionResult, RiskLabel};
use crate::logic::integrity::IntegritySummary;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Overall score needed for `passed`
pub const PASS_THRESHOLD: f64 = 70.0;

const NOT_COLLECTED: &str = "not collected";

// ============================================================================
// MAIN ASSESSMENT FUNCTION
// ============================================================================

/// Build a report. Always returns, whatever subset of inputs is present.
pub fn assess(inputs: &AssessmentInputs) -> AssessmentReport {
    let category_scores: Vec<CategoryScore> = AssessmentCategory::ALL
        .iter()
        .map(|category| score_category(*category, inputs.get(*category)))
        .collect();

    let evaluated: Vec<&CategoryScore> = category_scores.iter().filter(|s| s.evaluated).collect();

    if evaluated.is_empty() {
        log::warn!("Assessment has no evaluated category; reporting critical");
        return AssessmentReport {
            timestamp: Utc::now(),
            category_scores,
            overall_score: 0.0,
            security_level: SecurityLevel::Critical,
            risk_level: RiskLabel::Critical,
            passed: false,
            recommendations: vec![
                "No category could be evaluated; re-run evidence collection once the device is reachable"
                    .to_string(),
            ],
        };
    }

    let weight_sum: f64 = evaluated.iter().map(|s| s.weight).sum();
    let weighted: f64 = evaluated.iter().map(|s| s.score * s.weight).sum();
    let overall_score = round2((weighted / weight_sum).clamp(0.0, 100.0));

    let security_level = SecurityLevel::from_score(overall_score);
    let risk_level = risk_level_for(overall_score);
    let passed = overall_score >= PASS_THRESHOLD;
    let recommendations = build_recommendations(&category_scores);

    log::info!(
        "Assessment: overall {:.2} over {} categor(ies) -> {} (risk {}, passed={})",
        overall_score,
        evaluated.len(),
        security_level,
        risk_level,
        passed
    );

    AssessmentReport {
        timestamp: Utc::now(),
        category_scores,
        overall_score,
        security_level,
        risk_level,
        passed,
        recommendations,
    }
}

fn score_category(category: AssessmentCategory, input: Option<&CategoryInput>) -> CategoryScore {
    let excluded = |note: String| CategoryScore {
        category,
        score: 0.0,
        weight: category.weight(),
        evaluated: false,
        note: Some(note),
    };

    let score = match input {
        None => return excluded(NOT_COLLECTED.to_string()),
        Some(CategoryInput::Unevaluated { reason }) => return excluded(reason.clone()),
        Some(CategoryInput::Score { score }) if !score.is_finite() => {
            return excluded("non-finite score".to_string())
        }
        Some(CategoryInput::Score { score }) => score.clamp(0.0, 100.0),
        Some(CategoryInput::Rules { rules }) => evaluate_rules(rules),
    };

    CategoryScore {
        category,
        score,
        weight: category.weight(),
        evaluated: true,
        note: None,
    }
}

/// One line per category below its pass bar, then one per excluded category.
/// Canonical category order keeps the output stable.
fn build_recommendations(scores: &[CategoryScore]) -> Vec<String> {
    let failing = scores
        .iter()
        .filter(|s| s.evaluated && s.score < s.category.pass_bar())
        .map(|s| {
            format!(
                "[{}] {:.1} < {:.1}: {}",
                s.category,
                s.score,
                s.category.pass_bar(),
                recommendation_for(s.category)
            )
        });

    let excluded = scores
        .iter()
        .filter(|s| !s.evaluated && s.note.as_deref() != Some(NOT_COLLECTED))
        .map(|s| {
            format!(
                "[{}] not evaluated ({}); re-run collection for this category",
                s.category,
                s.note.as_deref().unwrap_or("unknown fault")
            )
        });

    failing.chain(excluded).collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================================================
// INPUT BUILDERS
// ============================================================================

/// Assessment inputs from detection outcomes and an optional integrity summary.
///
/// A scoring category is unevaluated when any detection feeding it failed, or
/// when nothing feeding it was collected at all.
pub fn inputs_from_detections(
    detections: &[Result<DetectionResult, DetectionError>],
    integrity: Option<&IntegritySummary>,
) -> AssessmentInputs {
    use super::rules::scoring_category_for;

    let mut inputs = AssessmentInputs::new();
    let succeeded: Vec<DetectionResult> = detections
        .iter()
        .filter_map(|d| d.as_ref().ok().cloned())
        .collect();

    for target in AssessmentCategory::ALL {
        if target == AssessmentCategory::FileIntegrity {
            continue;
        }

        let failure = detections.iter().find_map(|d| match d {
            Err(e) if scoring_category_for(e.category()) == target => Some(e.to_string()),
            _ => None,
        });
        if let Some(reason) = failure {
            inputs.set(target, CategoryInput::unevaluated(reason));
            continue;
        }

        let rules = detection_rules(target, &succeeded);
        if !rules.is_empty() {
            inputs.set(target, CategoryInput::rules(rules));
        }
    }

    if let Some(summary) = integrity {
        let input = match &summary.fault {
            Some(reason) => CategoryInput::unevaluated(reason.clone()),
            None => CategoryInput::rules(integrity_rules(summary)),
        };
        inputs.set(AssessmentCategory::FileIntegrity, input);
    }

    inputs
}

// ============================================================================
// TESTS
// ============================================================================
