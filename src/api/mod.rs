//! API Module
//!
//! Structure:
//! - engine.rs: `AssessmentEngine`, the stable entry point over the logic engines
//!
//! Usage:
//! - `AssessmentEngine::new(shell, EngineConfig::from_env())?.with_default_probes()?`
//! - `engine.run_assessment(None).await` for a full detection + scoring pass

pub mod engine;

pub use engine::{AssessmentEngine, DetectionCache};
