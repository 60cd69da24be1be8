//! Numerically stable running statistics.

use serde::{Deserialize, Serialize};

/// Welford online mean and variance.
///
/// One pass, O(1) per sample, stable for large offsets where the naive
/// sum-of-squares formulation loses precision.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OnlineStats {
    mean: f64,
    m2: f64,
    count: u64,
}

impl OnlineStats {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one sample into the accumulator.
    pub fn update(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Number of samples seen.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Running mean; 0 with no samples.
    #[must_use]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance; 0 with fewer than two samples.
    #[must_use]
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// Sample standard deviation.
    #[must_use]
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_accumulator_reports_zeros() {
        let stats = OnlineStats::new();
        assert_eq!(stats.count(), 0);
        assert_eq!(stats.mean(), 0.0);
        assert_eq!(stats.variance(), 0.0);
    }

    #[test]
    fn matches_closed_form_on_a_small_sample() {
        let mut stats = OnlineStats::new();
        for value in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            stats.update(value);
        }
        assert!((stats.mean() - 5.0).abs() < 1e-12);
        assert!((stats.variance() - 32.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn single_sample_has_zero_variance() {
        let mut stats = OnlineStats::new();
        stats.update(42.0);
        assert_eq!(stats.variance(), 0.0);
        assert_eq!(stats.mean(), 42.0);
    }

    #[test]
    fn stable_under_large_offsets() {
        let mut stats = OnlineStats::new();
        for i in 0..1000 {
            stats.update(1e9 + f64::from(i % 2));
        }
        assert!((stats.variance() - 0.25).abs() < 0.01);
    }
}
