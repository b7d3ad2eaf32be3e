//! Logic Module - Assessment Engines
//!
//! Contains the evidence, scoring and integrity engines.
//!
//! ## Layout
//! - `shell/` - Device Shell contract + bounded handle
//! - `detection/` - probes, collection, weighted verdicts
//! - `scoring/` - renormalized risk assessment
//! - `integrity/` - baselines, verified backups, config edits, monitoring

// Shared infrastructure
pub mod shell;
pub mod cache;
pub mod config;

// Engines
pub mod detection;
pub mod scoring;
pub mod integrity;
