//! Scoring Module
//!
//! Weighted risk assessment over the five scoring categories.
//!
//! ## Structure
//! - `types`: AssessmentCategory, CategoryInput, CategoryScore, AssessmentReport
//! - `rules`: deduction tables and the shared rule evaluator
//! - `assessor`: renormalized fusion into an `AssessmentReport`
//!
//! ## Usage
//! ```ignore
//! let inputs = AssessmentInputs::new()
//!     .with(AssessmentCategory::Device, CategoryInput::score(100.0));
//! let report = assess(&inputs);
//! assert_eq!(report.overall_score, 100.0);
//! ```

pub mod types;
pub mod rules;
pub mod assessor;

pub use types::{
    AssessmentCategory, AssessmentInputs, AssessmentReport, CategoryInput, CategoryScore,
    ScoringRule, SecurityLevel,
};
pub use rules::{evaluate_rules, risk_level_for};
pub use assessor::{assess, inputs_from_detections, PASS_THRESHOLD};
