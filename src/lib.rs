//! Device Guard - Device Security Assessment Engine
//!
//! Collects boolean security evidence from a device through an injected
//! Device Shell, fuses it into per-category verdicts, scores the device,
//! and guards selected files with verified backups and change monitoring.

pub mod constants;
pub mod logic;
pub mod api;

pub use api::AssessmentEngine;
pub use logic::config::EngineConfig;
pub use logic::detection::{Category, DetectionError, DetectionResult, ProbeSet, ProbeSetKey, RiskLabel};
pub use logic::integrity::{CancelToken, ConfigFormat, IntegrityError};
pub use logic::scoring::{AssessmentInputs, AssessmentReport, SecurityLevel};
pub use logic::shell::{DeviceShell, LocalShell, ShellError, ShellOutput};
