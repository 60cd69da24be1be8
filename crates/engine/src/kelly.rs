//! Fractional Kelly position scaling.
//!
//! Each strategy carries a bounded window of recent returns. The growth
//! optimal fraction `f* = mean / variance` is computed from exponentially
//! weighted moments over that window, cut to a configured fraction of
//! full Kelly, and optionally damped by a sample-size confidence ramp.
//! Strategies that have not proven themselves get a neutral 1.0; ones
//! with a losing record get 0.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::warn;

use capalloc_core::{KellyConfig, KellyDiagnostic, KellyReason, StrategyId};

/// Variances below this are treated as degenerate.
const VARIANCE_EPS: f64 = 1e-10;

/// Per-strategy fractional Kelly allocator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KellyAllocator {
    config: KellyConfig,
    windows: BTreeMap<StrategyId, VecDeque<f64>>,
}

impl KellyAllocator {
    /// Creates an allocator with an empty return window per strategy.
    #[must_use]
    pub fn new(config: KellyConfig, ids: &[StrategyId]) -> Self {
        let windows = ids
            .iter()
            .map(|id| (id.clone(), VecDeque::new()))
            .collect();
        Self { config, windows }
    }

    /// Strategy roster the allocator was built for.
    #[must_use]
    pub fn ids(&self) -> Vec<StrategyId> {
        self.windows.keys().cloned().collect()
    }

    /// Records one period return for a strategy.
    ///
    /// Unknown strategies are ignored; a strategy with no return this
    /// period simply is not recorded, so its window keeps its age.
    pub fn record(&mut self, id: &StrategyId, ret: f64) {
        let Some(window) = self.windows.get_mut(id) else {
            return;
        };
        window.push_back(ret);
        while window.len() > self.config.window_capacity() {
            window.pop_front();
        }
    }

    /// Computes the Kelly fraction and diagnostic for one strategy.
    #[must_use]
    pub fn fraction(&self, id: &StrategyId) -> KellyDiagnostic {
        let n = self.windows.get(id).map_or(0, VecDeque::len);

        if !self.config.enabled {
            return KellyDiagnostic {
                fraction: 1.0,
                reason: KellyReason::Disabled,
                sample_size: n,
                confidence: 1.0,
            };
        }
        if n < self.config.min_samples {
            return KellyDiagnostic {
                fraction: 1.0,
                reason: KellyReason::InsufficientData,
                sample_size: n,
                confidence: 1.0,
            };
        }

        let window = &self.windows[id];
        let (mean, variance) = self.weighted_moments(window);
        let confidence = self.confidence(n);

        if mean <= 0.0 {
            return KellyDiagnostic {
                fraction: 0.0,
                reason: KellyReason::NegativeMean,
                sample_size: n,
                confidence,
            };
        }
        if variance < VARIANCE_EPS {
            // A positive mean with no measurable variance cannot be
            // scaled meaningfully; cap at the maximum.
            return KellyDiagnostic {
                fraction: self.config.max_fraction,
                reason: KellyReason::VarianceFloor,
                sample_size: n,
                confidence,
            };
        }

        let full_kelly = mean / variance;
        let fraction = (self.config.beta * full_kelly * confidence)
            .clamp(0.0, self.config.max_fraction);
        KellyDiagnostic {
            fraction,
            reason: KellyReason::Scaled,
            sample_size: n,
            confidence,
        }
    }

    /// Scales raw consensus weights by each strategy's Kelly fraction.
    ///
    /// Returns the scaled weights, per-strategy diagnostics, and whether
    /// the uniform fallback fired. The fallback replaces an all-zero
    /// scaled portfolio with `min_allocation` per strategy so the engine
    /// keeps collecting live data instead of going flat forever. If the
    /// scaled weights sum above 1 they are renormalized proportionally.
    #[must_use]
    pub fn allocate(
        &self,
        raw: &BTreeMap<StrategyId, f64>,
    ) -> (
        BTreeMap<StrategyId, f64>,
        BTreeMap<StrategyId, KellyDiagnostic>,
        bool,
    ) {
        let mut scaled = BTreeMap::new();
        let mut diagnostics = BTreeMap::new();
        for id in self.windows.keys() {
            let diag = self.fraction(id);
            let weight = raw.get(id).copied().unwrap_or(0.0) * diag.fraction;
            scaled.insert(id.clone(), weight);
            diagnostics.insert(id.clone(), diag);
        }

        let total: f64 = scaled.values().sum();
        let fallback = total <= 0.0;
        if fallback {
            warn!("all Kelly-scaled weights are zero, applying uniform fallback");
            for weight in scaled.values_mut() {
                *weight = self.config.min_allocation;
            }
        } else if total > 1.0 {
            for weight in scaled.values_mut() {
                *weight /= total;
            }
        }
        (scaled, diagnostics, fallback)
    }

    /// Exponentially weighted mean and variance, newest sample heaviest.
    fn weighted_moments(&self, window: &VecDeque<f64>) -> (f64, f64) {
        let decay = self.config.decay;
        let mut weight = 1.0;
        let mut wsum = 0.0;
        let mut mean = 0.0;
        for &x in window.iter().rev() {
            wsum += weight;
            mean += weight * x;
            weight *= decay;
        }
        mean /= wsum;

        weight = 1.0;
        let mut var = 0.0;
        for &x in window.iter().rev() {
            let dev = x - mean;
            var += weight * dev * dev;
            weight *= decay;
        }
        (mean, var / wsum)
    }

    /// Confidence ramp from `min_confidence` at `min_samples` to 1.0 at
    /// `max_samples`. Identity when the adjustment is disabled.
    fn confidence(&self, n: usize) -> f64 {
        if !self.config.uncertainty_adjustment {
            return 1.0;
        }
        let span = (self.config.max_samples - self.config.min_samples).max(1) as f64;
        let t = (n.saturating_sub(self.config.min_samples) as f64 / span).clamp(0.0, 1.0);
        self.config.min_confidence + (1.0 - self.config.min_confidence) * t
    }
}
