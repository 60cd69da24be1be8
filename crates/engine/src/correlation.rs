//! Online correlation tracking across strategies.
//!
//! Maintains exponentially weighted means and a co-moment matrix over
//! per-strategy returns, then derives a shrunk, positive-definite
//! correlation matrix on demand. Until `min_samples` returns have been
//! seen the tracker reports the identity matrix, which makes the
//! downstream covariance penalty a no-op during warmup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use capalloc_core::{CorrelationConfig, OnlineStats, StrategyId};

// =============================================================================
// Matrix
// =============================================================================

/// A symmetric correlation matrix over the strategy roster.
///
/// Row/column order follows the roster order the tracker was built with.
/// Diagonal entries are exactly 1 and off-diagonals lie in `[-1, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    n: usize,
    values: Vec<f64>,
}

impl CorrelationMatrix {
    fn identity(n: usize) -> Self {
        let mut values = vec![0.0; n * n];
        for i in 0..n {
            values[i * n + i] = 1.0;
        }
        Self { n, values }
    }

    /// Number of strategies (matrix dimension).
    #[must_use]
    pub fn dim(&self) -> usize {
        self.n
    }

    /// Correlation between strategies `i` and `j` in roster order.
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.n + j]
    }

    /// Largest absolute off-diagonal correlation. Zero for a single
    /// strategy.
    #[must_use]
    pub fn max_pairwise(&self) -> f64 {
        let mut max = 0.0_f64;
        for i in 0..self.n {
            for j in (i + 1)..self.n {
                max = max.max(self.get(i, j).abs());
            }
        }
        max
    }

    /// Mean off-diagonal correlation. Zero for a single strategy.
    #[must_use]
    pub fn avg_pairwise(&self) -> f64 {
        if self.n < 2 {
            return 0.0;
        }
        let mut sum = 0.0;
        let mut pairs = 0usize;
        for i in 0..self.n {
            for j in (i + 1)..self.n {
                sum += self.get(i, j);
                pairs += 1;
            }
        }
        sum / pairs as f64
    }

    /// Covariance concentration penalty for a weight vector:
    /// `sum over i != j of w_i * w_j * c_ij`.
    ///
    /// Identity matrices yield exactly zero for any weights.
    #[must_use]
    pub fn penalty(&self, weights: &[f64]) -> f64 {
        debug_assert_eq!(weights.len(), self.n);
        let mut total = 0.0;
        for i in 0..self.n {
            for j in 0..self.n {
                if i != j {
                    total += weights[i] * weights[j] * self.get(i, j);
                }
            }
        }
        total
    }

    /// Scales off-diagonal mass so the Gershgorin eigenvalue lower bound
    /// is at least `epsilon`, keeping the unit diagonal intact.
    fn regularize(&mut self, epsilon: f64) {
        let mut max_off = 0.0_f64;
        for i in 0..self.n {
            let mut row = 0.0;
            for j in 0..self.n {
                if i != j {
                    row += self.get(i, j).abs();
                }
            }
            max_off = max_off.max(row);
        }
        let bound = 1.0 - max_off;
        if bound >= epsilon {
            return;
        }
        let scale = (1.0 - epsilon) / max_off;
        for i in 0..self.n {
            for j in 0..self.n {
                if i != j {
                    self.values[i * self.n + j] *= scale;
                }
            }
        }
        debug!(bound, scale, "tightened correlation matrix toward identity");
    }
}

// =============================================================================
// Tracker
// =============================================================================

/// Exponentially weighted tracker of cross-strategy return correlation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationTracker {
    config: CorrelationConfig,
    ids: Vec<StrategyId>,
    count: u64,
    means: Vec<f64>,
    /// Row-major co-moment matrix, same order as `ids`.
    comoments: Vec<f64>,
    /// Lifetime Welford statistics per strategy, for diagnostics.
    stats: Vec<OnlineStats>,
}

impl CorrelationTracker {
    /// Creates a tracker for the given roster.
    #[must_use]
    pub fn new(config: CorrelationConfig, ids: Vec<StrategyId>) -> Self {
        let n = ids.len();
        Self {
            config,
            ids,
            count: 0,
            means: vec![0.0; n],
            comoments: vec![0.0; n * n],
            stats: vec![OnlineStats::new(); n],
        }
    }

    /// Strategy roster, in matrix row order.
    #[must_use]
    pub fn ids(&self) -> &[StrategyId] {
        &self.ids
    }

    /// Number of return vectors folded in so far.
    #[must_use]
    pub fn sample_count(&self) -> u64 {
        self.count
    }

    /// Lifetime Welford statistics for one strategy's returns.
    #[must_use]
    pub fn strategy_stats(&self, id: &StrategyId) -> Option<&OnlineStats> {
        let index = self.ids.iter().position(|other| other == id)?;
        Some(&self.stats[index])
    }

    /// Current tracked correlation between two strategies, or `None` for
    /// an unknown id. Reads are idempotent.
    #[must_use]
    pub fn pairwise(&self, a: &StrategyId, b: &StrategyId) -> Option<f64> {
        let i = self.ids.iter().position(|other| other == a)?;
        let j = self.ids.iter().position(|other| other == b)?;
        Some(self.matrix().get(i, j))
    }

    /// Folds one period of per-strategy returns into the estimate.
    ///
    /// Strategies missing from `returns` contribute 0.0 for the period.
    pub fn update(&mut self, returns: &BTreeMap<StrategyId, f64>) {
        let n = self.ids.len();
        let sample: Vec<f64> = self
            .ids
            .iter()
            .map(|id| returns.get(id).copied().unwrap_or(0.0))
            .collect();

        for (stat, &x) in self.stats.iter_mut().zip(&sample) {
            stat.update(x);
        }

        self.count += 1;
        if self.count == 1 {
            self.means.copy_from_slice(&sample);
            return;
        }

        let lambda = self.config.decay;
        for (mean, &x) in self.means.iter_mut().zip(&sample) {
            *mean = lambda * *mean + (1.0 - lambda) * x;
        }
        let devs: Vec<f64> = sample
            .iter()
            .zip(&self.means)
            .map(|(&x, &m)| x - m)
            .collect();
        for i in 0..n {
            for j in 0..n {
                let cell = &mut self.comoments[i * n + j];
                *cell = lambda * *cell + (1.0 - lambda) * devs[i] * devs[j];
            }
        }
    }

    /// Derives the current correlation matrix.
    ///
    /// Identity until `min_samples` periods have been observed. The
    /// result is shrunk toward identity by the configured intensity and
    /// then regularized so its smallest eigenvalue is bounded away from
    /// zero.
    #[must_use]
    pub fn matrix(&self) -> CorrelationMatrix {
        let n = self.ids.len();
        if (self.count as usize) < self.config.min_samples {
            return CorrelationMatrix::identity(n);
        }

        let eps = self.config.epsilon;
        let stds: Vec<f64> = (0..n)
            .map(|i| self.comoments[i * n + i].max(0.0).sqrt().max(eps))
            .collect();

        let shrink = self.config.shrinkage;
        let mut matrix = CorrelationMatrix::identity(n);
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let corr = (self.comoments[i * n + j] / (stds[i] * stds[j])).clamp(-1.0, 1.0);
                matrix.values[i * n + j] = (1.0 - shrink) * corr;
            }
        }
        matrix.regularize(eps);
        matrix
    }
}
