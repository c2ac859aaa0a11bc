//! Memory-leak heuristic over per-iteration live-heap deltas.
//!
//! A benchmark is flagged as leaking only when all three conditions hold:
//! the deltas spread out beyond the variance threshold relative to their
//! mean, the step-to-step trend is upward on average, and at least one step
//! exceeds the minimum-bytes floor. Steady noise, shrinking usage and tiny
//! jitter all pass.

use serde::Serialize;

/// Outcome of the leak heuristic, with the intermediate measures kept for
/// reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeakReport {
    /// Whether all three leak conditions held.
    pub leaking: bool,
    /// `(max - min) / mean` of the deltas; 0 when the mean is zero.
    pub variance_ratio: f64,
    /// Mean of the first differences between consecutive deltas.
    pub trend: f64,
    /// Largest single first difference, in bytes.
    pub max_step: f64,
}

impl LeakReport {
    fn steady() -> Self {
        Self {
            leaking: false,
            variance_ratio: 0.0,
            trend: 0.0,
            max_step: 0.0,
        }
    }
}

/// Apply the heuristic to per-iteration live-heap deltas.
///
/// `variance_threshold` is the ratio of spread to mean above which growth is
/// suspicious; `minimum_step_bytes` ignores growth whose largest step stays
/// below the floor. Fewer than two samples can show no trend and are never
/// considered leaking.
pub fn detect_leak(
    deltas: &[i64],
    variance_threshold: f64,
    minimum_step_bytes: u64,
) -> LeakReport {
    if deltas.len() < 2 {
        return LeakReport::steady();
    }

    let n = deltas.len() as f64;
    let mean = deltas.iter().map(|&d| d as f64).sum::<f64>() / n;
    let min = deltas.iter().copied().min().unwrap_or(0) as f64;
    let max = deltas.iter().copied().max().unwrap_or(0) as f64;
    let variance_ratio = if mean == 0.0 {
        0.0
    } else {
        let ratio = (max - min) / mean;
        if ratio.is_finite() { ratio } else { 0.0 }
    };

    let steps: Vec<f64> = deltas
        .windows(2)
        .map(|pair| (pair[1] - pair[0]) as f64)
        .collect();
    let trend = steps.iter().sum::<f64>() / steps.len() as f64;
    let max_step = steps.iter().copied().fold(f64::MIN, f64::max);

    let leaking = variance_ratio > variance_threshold
        && trend > 0.0
        && max_step > minimum_step_bytes as f64;

    LeakReport {
        leaking,
        variance_ratio,
        trend,
        max_step,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn flat_usage_is_not_leaking() {
        let report = detect_leak(&[1, 1, 1, 1, 1], 0.05, 16);
        assert!(!report.leaking);
        assert_eq!(report.variance_ratio, 0.0);
    }

    #[test]
    fn doubling_growth_is_leaking() {
        let report = detect_leak(&[1024, 2048, 4096, 8192, 16384], 0.05, 16);
        assert!(report.leaking);
        assert!(report.trend > 0.0);
    }

    #[test]
    fn oscillation_is_not_leaking() {
        // High variance but no upward trend.
        let report = detect_leak(&[5000, 1000, 5000, 1000, 5000], 0.05, 16);
        assert!(!report.leaking);
    }

    #[test]
    fn growth_below_the_minimum_step_is_ignored() {
        let report = detect_leak(&[100, 200, 400, 800], 0.05, 512 * 1024);
        assert!(!report.leaking);
        assert!(report.max_step < (512 * 1024) as f64);
    }

    #[test]
    fn too_few_samples_are_never_leaking() {
        assert!(!detect_leak(&[], 0.05, 16).leaking);
        assert!(!detect_leak(&[1_000_000], 0.05, 16).leaking);
    }

    #[test]
    fn zero_mean_does_not_divide_by_zero() {
        let report = detect_leak(&[-100, 100, -100, 100], 0.05, 16);
        assert_eq!(report.variance_ratio, 0.0);
        assert!(!report.leaking);
    }

    proptest! {
        #[test]
        fn constant_series_never_leak(value in -1_000_000_i64..1_000_000, len in 2_usize..50) {
            let deltas = vec![value; len];
            prop_assert!(!detect_leak(&deltas, 0.05, 16).leaking);
        }

        #[test]
        fn strictly_decreasing_series_never_leak(start in 0_i64..1_000_000, len in 2_usize..50) {
            let deltas: Vec<i64> = (0..len as i64).map(|i| start - i * 1024).collect();
            prop_assert!(!detect_leak(&deltas, 0.05, 16).leaking);
        }
    }
}
