//! Detection Module
//!
//! Turns raw boolean evidence into a per-category verdict.
//!
//! ## Structure
//! - `types`: Category, Indicator, DetectionResult, RiskLabel
//! - `probes`: Probe trait, CommandProbe, default probe sets
//! - `collector`: runs probes against the Device Shell (failure-isolated)
//! - `rules`: thresholds and risk mapping
//! - `aggregator`: weighted-evidence fusion
//!
//! ## Usage
//! ```ignore
//! let set = default_probe_set(Category::Root)?;
//! let result = detect(&shell, &set, &DetectionThresholds::default()).await?;
//! if result.detected {
//!     println!("{} ({})", result.category, result.risk_label);
//! }
//! ```

pub mod types;
pub mod probes;
pub mod collector;
pub mod rules;
pub mod aggregator;

pub use types::{Category, DetectionError, DetectionResult, Indicator, RiskLabel};
pub use probes::{default_probe_set, CommandProbe, Predicate, Probe, ProbeSet, ProbeSetKey};
pub use collector::{collect, Collection};
pub use rules::DetectionThresholds;
pub use aggregator::{aggregate, weighted_confidence};

use crate::logic::shell::ShellHandle;

/// Collect and fuse evidence for one category.
///
/// A dead channel is surfaced as `DetectionError::DeviceUnreachable` carrying
/// the partial indicators, never as a verdict built from half the evidence.
pub async fn detect(
    shell: &ShellHandle,
    set: &ProbeSet,
    thresholds: &DetectionThresholds,
) -> Result<DetectionResult, DetectionError> {
    let collection = collect(shell, set).await;

    if let Some(reason) = collection.unreachable {
        return Err(DetectionError::DeviceUnreachable {
            category: collection.category,
            partial: collection.indicators,
            reason,
        });
    }

    let result = aggregate(collection.category, &collection.indicators, thresholds);
    log::info!(
        "[{}] confidence {:.2} ({}/{} fired) -> detected={} risk={}",
        result.category,
        result.confidence,
        result.indicators_fired,
        result.indicators_total,
        result.detected,
        result.risk_label
    );
    Ok(result)
}
