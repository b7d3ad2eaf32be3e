//! Detection Aggregator
//!
//! Pure weighted-evidence fusion. Input: indicators + thresholds.
//! Output: `DetectionResult`. Nothing random happens in here, so identical
//! indicator sets always produce identical verdicts.

use chrono::Utc;

use super::rules::{risk_label_for, DetectionThresholds};
use super::types::{Category, DetectionResult, Indicator, RiskLabel};

/// `Σ(w·detected) / Σ(w)`, clamped to [0, 1]. Zero total weight gives 0.
pub fn weighted_confidence(indicators: &[Indicator]) -> f64 {
    let total: f64 = indicators.iter().map(|i| i.weight.max(0.0)).sum();
    if total <= f64::EPSILON {
        return 0.0;
    }

    let fired: f64 = indicators
        .iter()
        .filter(|i| i.detected)
        .map(|i| i.weight.max(0.0))
        .sum();

    (fired / total).clamp(0.0, 1.0)
}

/// Fuse a category's indicators into a verdict
pub fn aggregate(
    category: Category,
    indicators: &[Indicator],
    thresholds: &DetectionThresholds,
) -> DetectionResult {
    let confidence = weighted_confidence(indicators);
    let detected = confidence > thresholds.threshold_for(category);

    let risk_label = if detected {
        risk_label_for(category)
    } else {
        RiskLabel::Low
    };

    let faults = indicators
        .iter()
        .filter_map(|i| i.fault.as_ref().map(|f| format!("{}: {}", i.name, f)))
        .collect();

    DetectionResult {
        category,
        detected,
        confidence,
        indicators_fired: indicators.iter().filter(|i| i.detected).count(),
        indicators_total: indicators.len(),
        risk_label,
        timestamp: Utc::now(),
        faults,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn root_indicators(su: bool, apps: bool, writable: bool, props: bool) -> Vec<Indicator> {
        vec![
            Indicator::new("su_binary", Category::Root, su, 0.25),
            Indicator::new("root_apps", Category::Root, apps, 0.25),
            Indicator::new("system_writable", Category::Root, writable, 0.25),
            Indicator::new("dangerous_props", Category::Root, props, 0.25),
        ]
    }

    #[test]
    fn test_clean_root_indicators() {
        let result = aggregate(
            Category::Root,
            &root_indicators(false, false, false, false),
            &DetectionThresholds::default(),
        );
        assert_eq!(result.confidence, 0.0);
        assert!(!result.detected);
        assert_eq!(result.risk_label, RiskLabel::Low);
        assert_eq!(result.indicators_fired, 0);
        assert_eq!(result.indicators_total, 4);
    }

    #[test]
    fn test_half_root_evidence_crosses_low_threshold() {
        let result = aggregate(
            Category::Root,
            &root_indicators(true, false, true, false),
            &DetectionThresholds::default(),
        );
        assert_eq!(result.confidence, 0.5);
        assert!(result.detected);
        assert_eq!(result.risk_label, RiskLabel::Critical);
        assert_eq!(result.indicators_fired, 2);
    }

    #[test]
    fn test_threshold_is_strict_greater_than() {
        // 2 of 4 emulator signals = 0.5, which is not > 0.5
        let indicators = vec![
            Indicator::new("qemu_props", Category::Emulator, true, 0.25),
            Indicator::new("generic_build", Category::Emulator, true, 0.25),
            Indicator::new("goldfish_hardware", Category::Emulator, false, 0.25),
            Indicator::new("emulator_files", Category::Emulator, false, 0.25),
        ];
        let result = aggregate(Category::Emulator, &indicators, &DetectionThresholds::default());
        assert!(!result.detected);
        assert_eq!(result.risk_label, RiskLabel::Low);
    }

    #[test]
    fn test_weighted_fusion() {
        let indicators = vec![
            Indicator::new("adb_enabled", Category::Debug, true, 0.6),
            Indicator::new("debuggable_build", Category::Debug, false, 0.2),
            Indicator::new("developer_options", Category::Debug, false, 0.2),
        ];
        let result = aggregate(Category::Debug, &indicators, &DetectionThresholds::default());
        assert!((result.confidence - 0.6).abs() < 1e-9);
        assert!(result.detected);
        assert_eq!(result.risk_label, RiskLabel::Medium);
    }

    #[test]
    fn test_empty_indicator_set() {
        let result = aggregate(Category::Network, &[], &DetectionThresholds::default());
        assert_eq!(result.confidence, 0.0);
        assert!(!result.detected);
        assert_eq!(result.indicators_total, 0);
    }

    #[test]
    fn test_determinism() {
        let indicators = root_indicators(true, true, false, false);
        let thresholds = DetectionThresholds::default();
        let first = aggregate(Category::Root, &indicators, &thresholds);
        for _ in 0..50 {
            let again = aggregate(Category::Root, &indicators, &thresholds);
            assert_eq!(again.confidence, first.confidence);
            assert_eq!(again.detected, first.detected);
            assert_eq!(again.risk_label, first.risk_label);
        }
    }

    #[test]
    fn test_confidence_bounds_for_all_combinations() {
        for mask in 0u8..16 {
            let indicators = root_indicators(
                mask & 1 != 0,
                mask & 2 != 0,
                mask & 4 != 0,
                mask & 8 != 0,
            );
            let c = weighted_confidence(&indicators);
            assert!((0.0..=1.0).contains(&c));
            assert_eq!(c, mask.count_ones() as f64 / 4.0);
        }
    }

    #[test]
    fn test_faults_are_carried() {
        let mut indicators = root_indicators(false, false, false, false);
        indicators[1] = Indicator::faulted("root_apps", Category::Root, 0.25, "timed out");
        let result = aggregate(Category::Root, &indicators, &DetectionThresholds::default());
        assert_eq!(result.faults, vec!["root_apps: timed out".to_string()]);
        assert!(!result.detected);
    }
}
