//! Volatility regime detection via recursive variance filters.
//!
//! Two exponentially weighted variance estimators run over the mean
//! portfolio return at different horizons. Their ratio classifies the
//! current [`Regime`], which in turn sets the particle filter's
//! forgetting rate: volatile markets forget history faster.

use serde::{Deserialize, Serialize};

use capalloc_core::Regime;

/// Fast estimator horizon, in periods.
const FAST_PERIOD: usize = 10;
/// Slow estimator horizon, in periods.
const SLOW_PERIOD: usize = 50;
/// Below this fast/slow ratio the market is calm.
const CALM_RATIO: f64 = 0.7;
/// Above this fast/slow ratio the market is volatile.
const VOLATILE_RATIO: f64 = 1.5;
/// Slow variance below this is treated as "no signal yet".
const VARIANCE_FLOOR: f64 = 1e-10;

/// Slowest forgetting rate, used when the ratio is at or below calm.
const MAX_FORGETTING: f64 = 0.99;
/// Total forgetting-rate range across the ratio band.
const FORGETTING_SPAN: f64 = 0.04;

// =============================================================================
// Recursive variance
// =============================================================================

/// Exponentially weighted mean and variance with O(1) updates.
///
/// Uses the EMA smoothing `alpha = 2 / (period + 1)`. The first sample
/// initializes the mean directly so early estimates are not dragged
/// toward zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecursiveVariance {
    alpha: f64,
    mean: f64,
    variance: f64,
    count: u64,
}

impl RecursiveVariance {
    /// Creates an estimator with the given smoothing period.
    #[must_use]
    pub fn new(period: usize) -> Self {
        Self {
            alpha: 2.0 / (period as f64 + 1.0),
            mean: 0.0,
            variance: 0.0,
            count: 0,
        }
    }

    /// Folds one sample into the estimate.
    pub fn update(&mut self, value: f64) {
        self.count += 1;
        if self.count == 1 {
            self.mean = value;
            return;
        }
        let diff = value - self.mean;
        let incr = self.alpha * diff;
        self.mean += incr;
        self.variance = (1.0 - self.alpha) * (self.variance + diff * incr);
    }

    /// Current variance estimate.
    #[must_use]
    pub fn variance(&self) -> f64 {
        self.variance
    }
}

// =============================================================================
// Detector
// =============================================================================

/// Classifies volatility regimes from the fast/slow variance ratio and
/// maps them onto an adaptive forgetting rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityRegimeDetector {
    fast: RecursiveVariance,
    slow: RecursiveVariance,
    regime: Regime,
    ratio: f64,
}

impl Default for VolatilityRegimeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl VolatilityRegimeDetector {
    /// Creates a detector with the standard 10/50 period pair.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fast: RecursiveVariance::new(FAST_PERIOD),
            slow: RecursiveVariance::new(SLOW_PERIOD),
            regime: Regime::Normal,
            ratio: 1.0,
        }
    }

    /// Folds one portfolio return into both estimators and reclassifies.
    ///
    /// Until the slow estimator has real variance the ratio is pinned to
    /// 1.0, which keeps the regime at Normal through warmup.
    pub fn update(&mut self, value: f64) -> Regime {
        self.fast.update(value);
        self.slow.update(value);

        self.ratio = if self.slow.variance() < VARIANCE_FLOOR {
            1.0
        } else {
            self.fast.variance() / self.slow.variance()
        };

        self.regime = if self.ratio < CALM_RATIO {
            Regime::Calm
        } else if self.ratio > VOLATILE_RATIO {
            Regime::Volatile
        } else {
            Regime::Normal
        };
        self.regime
    }

    /// Current regime classification.
    #[must_use]
    pub fn regime(&self) -> Regime {
        self.regime
    }

    /// Current fast/slow variance ratio.
    #[must_use]
    pub fn variance_ratio(&self) -> f64 {
        self.ratio
    }

    /// Forgetting rate implied by the current ratio.
    ///
    /// Linear in the ratio between the calm and volatile cutoffs:
    /// 0.99 at or below calm, 0.95 at or beyond volatile.
    #[must_use]
    pub fn forgetting_rate(&self) -> f64 {
        let span = VOLATILE_RATIO - CALM_RATIO;
        let t = ((self.ratio - CALM_RATIO) / span).clamp(0.0, 1.0);
        MAX_FORGETTING - FORGETTING_SPAN * t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_initializes_mean() {
        let mut rv = RecursiveVariance::new(10);
        rv.update(5.0);
        assert_eq!(rv.variance(), 0.0);
    }

    #[test]
    fn constant_series_has_zero_variance() {
        let mut rv = RecursiveVariance::new(10);
        for _ in 0..100 {
            rv.update(3.0);
        }
        assert!(rv.variance().abs() < 1e-12);
    }

    #[test]
    fn variance_tracks_dispersion() {
        let mut narrow = RecursiveVariance::new(10);
        let mut wide = RecursiveVariance::new(10);
        for i in 0..200 {
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            narrow.update(sign * 0.01);
            wide.update(sign * 0.05);
        }
        assert!(wide.variance() > narrow.variance());
    }

    #[test]
    fn warmup_reports_normal() {
        let mut detector = VolatilityRegimeDetector::new();
        assert_eq!(detector.update(0.0), Regime::Normal);
        assert_eq!(detector.variance_ratio(), 1.0);
    }

    #[test]
    fn volatility_spike_flips_to_volatile() {
        let mut detector = VolatilityRegimeDetector::new();
        // Long stable stretch so the slow estimator settles low.
        for i in 0..200 {
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            detector.update(sign * 0.001);
        }
        // Sudden wide swings dominate the fast estimator first.
        for i in 0..10 {
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            detector.update(sign * 0.05);
        }
        assert_eq!(detector.regime(), Regime::Volatile);
        assert!((detector.forgetting_rate() - 0.95).abs() < 1e-9);
    }

    #[test]
    fn calm_after_volatility_slows_forgetting() {
        let mut detector = VolatilityRegimeDetector::new();
        for i in 0..60 {
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            detector.update(sign * 0.05);
        }
        // Fast estimator collapses well before the slow one.
        for _ in 0..100 {
            detector.update(0.0001);
        }
        assert_eq!(detector.regime(), Regime::Calm);
        assert!((detector.forgetting_rate() - 0.99).abs() < 1e-9);
    }

    #[test]
    fn forgetting_rate_is_bounded() {
        let mut detector = VolatilityRegimeDetector::new();
        for i in 0..500 {
            detector.update((i as f64 * 0.7).sin() * 0.02);
            let rate = detector.forgetting_rate();
            assert!((0.95..=0.99).contains(&rate));
        }
    }
}
