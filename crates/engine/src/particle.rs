//! Bayesian particle filter over portfolio weight vectors.
//!
//! Each particle is a candidate allocation on the simplex. Particles
//! accumulate discounted log-fitness from realized returns (minus a
//! correlation concentration penalty), and the population consensus is
//! the fitness-weighted mean allocation. Every period the population is
//! jittered with Gaussian noise to keep exploring the simplex; when
//! fitness mass concentrates on too few particles it is additionally
//! resampled systematically.
//!
//! All randomness flows through a single `ChaCha8Rng`, so a seeded
//! allocator is fully reproducible and its stream survives snapshots.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use capalloc_core::{ParticleConfig, StrategyId};

use crate::correlation::CorrelationMatrix;

/// Result of one particle filter step.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleUpdate {
    /// Consensus weights in roster order; sums to 1.
    pub consensus: Vec<f64>,
    /// Per-strategy weight variance across the population.
    pub uncertainty: Vec<f64>,
    /// Effective particle count before any resample.
    pub effective_particles: f64,
    /// Whether the population was resampled this step.
    pub resampled: bool,
}

/// Particle filter allocator over the strategy roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleAllocator {
    config: ParticleConfig,
    ids: Vec<StrategyId>,
    /// Flat row-major particle store: `particle_count` rows of `ids.len()`
    /// weights, each row on the simplex.
    particles: Vec<f64>,
    log_weights: Vec<f64>,
    rng: ChaCha8Rng,
}

impl ParticleAllocator {
    /// Creates a population of uniformly random simplex points.
    ///
    /// A seed pins the full random stream for reproducible runs; `None`
    /// draws from entropy.
    #[must_use]
    pub fn new(config: ParticleConfig, ids: Vec<StrategyId>, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let n = ids.len();
        let m = config.particle_count;
        let mut particles = vec![0.0; m * n];
        for row in particles.chunks_mut(n) {
            for cell in row.iter_mut() {
                *cell = rng.gen::<f64>();
            }
            normalize_row(row);
        }
        Self {
            config,
            ids,
            particles,
            log_weights: vec![0.0; m],
            rng,
        }
    }

    /// Strategy roster, in consensus-vector order.
    #[must_use]
    pub fn ids(&self) -> &[StrategyId] {
        &self.ids
    }

    /// Advances the filter by one period.
    ///
    /// `returns` must be in roster order. `forgetting` discounts the
    /// accumulated log-fitness before this period's fitness is added, so
    /// volatile regimes (lower rates) shorten the filter's memory.
    pub fn update(
        &mut self,
        returns: &[f64],
        matrix: &CorrelationMatrix,
        forgetting: f64,
    ) -> ParticleUpdate {
        let n = self.ids.len();
        let m = self.config.particle_count;
        debug_assert_eq!(returns.len(), n);

        let lambda = self.config.lambda_penalty;
        for (row, log_weight) in self.particles.chunks(n).zip(self.log_weights.iter_mut()) {
            let mut fitness: f64 = row.iter().zip(returns).map(|(w, r)| w * r).sum();
            // lambda == 0 must reproduce the penalty-free filter exactly,
            // so the penalty term is skipped rather than multiplied out.
            if lambda > 0.0 {
                fitness -= lambda * matrix.penalty(row);
            }
            *log_weight = forgetting * *log_weight + fitness;
        }

        let weights = self.normalized_weights();
        let ess = 1.0 / weights.iter().map(|w| w * w).sum::<f64>();
        let resampled = ess < self.config.resample_threshold * m as f64;

        let consensus_weights = if resampled {
            debug!(
                effective_particles = ess,
                threshold = self.config.resample_threshold,
                "particle diversity collapsed, resampling"
            );
            self.resample(&weights);
            vec![1.0 / m as f64; m]
        } else {
            weights
        };
        // Mutation runs every period, not just after a resample: the
        // population keeps exploring the simplex even while fitness is
        // merely re-weighting it.
        self.mutate();

        let mut consensus = vec![0.0; n];
        for (row, &weight) in self.particles.chunks(n).zip(&consensus_weights) {
            for (total, &value) in consensus.iter_mut().zip(row) {
                *total += weight * value;
            }
        }
        let mut uncertainty = vec![0.0; n];
        for (row, &weight) in self.particles.chunks(n).zip(&consensus_weights) {
            for ((total, &value), &center) in uncertainty.iter_mut().zip(row).zip(&consensus) {
                let dev = value - center;
                *total += weight * dev * dev;
            }
        }

        ParticleUpdate {
            consensus,
            uncertainty,
            effective_particles: ess,
            resampled,
        }
    }

    /// Max-subtracted softmax of the accumulated log-fitness.
    fn normalized_weights(&self) -> Vec<f64> {
        let max = self
            .log_weights
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let mut weights: Vec<f64> = self.log_weights.iter().map(|lw| (lw - max).exp()).collect();
        let total: f64 = weights.iter().sum();
        for weight in &mut weights {
            *weight /= total;
        }
        weights
    }

    /// Systematic resampling with a single uniform draw.
    ///
    /// Positions `(u + k) / M` sweep the cumulative weight distribution,
    /// which preserves high-weight particles with low variance. Log
    /// weights reset to zero for the fresh population.
    fn resample(&mut self, weights: &[f64]) {
        let n = self.ids.len();
        let m = self.config.particle_count;
        let u = self.rng.gen::<f64>() / m as f64;

        let mut next = Vec::with_capacity(self.particles.len());
        let mut cumulative = weights[0];
        let mut index = 0usize;
        for k in 0..m {
            let target = u + k as f64 / m as f64;
            while cumulative < target && index + 1 < m {
                index += 1;
                cumulative += weights[index];
            }
            next.extend_from_slice(&self.particles[index * n..(index + 1) * n]);
        }
        self.particles = next;
        self.log_weights.fill(0.0);
    }

    /// Gaussian jitter on every component, clamped to the simplex.
    fn mutate(&mut self) {
        let n = self.ids.len();
        let std = self.config.mutation_std;
        if std <= 0.0 {
            return;
        }
        for row in self.particles.chunks_mut(n) {
            for cell in row.iter_mut() {
                let noise: f64 = self.rng.sample(StandardNormal);
                *cell = (*cell + std * noise).max(0.0);
            }
            normalize_row(row);
        }
    }
}

/// Projects a non-negative row onto the simplex; degenerate rows become
/// uniform.
fn normalize_row(row: &mut [f64]) {
    let total: f64 = row.iter().sum();
    if total > 0.0 {
        for cell in row.iter_mut() {
            *cell /= total;
        }
    } else {
        let uniform = 1.0 / row.len() as f64;
        row.fill(uniform);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(n: usize) -> Vec<StrategyId> {
        (0..n).map(|i| StrategyId::from(format!("s{i}"))).collect()
    }

    fn allocator(seed: u64) -> ParticleAllocator {
        ParticleAllocator::new(ParticleConfig::default(), roster(3), Some(seed))
    }

    fn identity(n: usize) -> CorrelationMatrix {
        // A tracker with no samples reports identity.
        use capalloc_core::CorrelationConfig;
        crate::correlation::CorrelationTracker::new(CorrelationConfig::default(), roster(n))
            .matrix()
    }

    fn assert_simplex(weights: &[f64]) {
        let total: f64 = weights.iter().sum();
        assert!((total - 1.0).abs() < 1e-9, "sum {total}");
        assert!(weights.iter().all(|w| *w >= 0.0));
    }

    // ==================== Invariants ====================

    #[test]
    fn initial_population_lives_on_the_simplex() {
        let alloc = allocator(7);
        for row in alloc.particles.chunks(3) {
            assert_simplex(row);
        }
    }

    #[test]
    fn consensus_stays_on_the_simplex() {
        let mut alloc = allocator(7);
        let matrix = identity(3);
        for i in 0..200 {
            let r = (i as f64 * 0.7).sin() * 0.02;
            let update = alloc.update(&[r, -r, r * 0.5], &matrix, 0.99);
            assert_simplex(&update.consensus);
            assert!(update.effective_particles > 0.0);
            assert!(update.effective_particles <= 100.0 + 1e-9);
        }
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let matrix = identity(3);
        let mut a = allocator(42);
        let mut b = allocator(42);
        for i in 0..100 {
            let r = (i as f64 * 0.3).cos() * 0.01;
            let ua = a.update(&[r, 0.0, -r], &matrix, 0.98);
            let ub = b.update(&[r, 0.0, -r], &matrix, 0.98);
            assert_eq!(ua, ub);
        }
    }

    // ==================== Learning ====================

    #[test]
    fn consensus_tilts_toward_the_winning_strategy() {
        let mut alloc = allocator(11);
        let matrix = identity(3);
        let mut last = ParticleUpdate {
            consensus: vec![],
            uncertainty: vec![],
            effective_particles: 0.0,
            resampled: false,
        };
        // s0 wins every period.
        for _ in 0..300 {
            last = alloc.update(&[0.02, -0.01, -0.01], &matrix, 0.99);
        }
        assert!(last.consensus[0] > last.consensus[1]);
        assert!(last.consensus[0] > last.consensus[2]);
        assert!(last.consensus[0] > 0.5, "got {}", last.consensus[0]);
    }

    #[test]
    fn persistent_pressure_eventually_resamples() {
        let mut alloc = allocator(13);
        let matrix = identity(3);
        let mut resampled_once = false;
        for _ in 0..500 {
            let update = alloc.update(&[0.05, -0.05, -0.05], &matrix, 0.999);
            resampled_once |= update.resampled;
        }
        assert!(resampled_once, "fitness pressure never triggered a resample");
    }

    #[test]
    fn resample_restores_diversity() {
        let mut alloc = allocator(13);
        let matrix = identity(3);
        for _ in 0..1000 {
            let update = alloc.update(&[0.05, -0.05, -0.05], &matrix, 0.999);
            if update.resampled {
                // Fresh population: uniform fitness weights.
                let next = alloc.update(&[0.0, 0.0, 0.0], &matrix, 0.99);
                assert!(next.effective_particles > 99.0);
                return;
            }
        }
        panic!("fitness pressure never triggered a resample");
    }

    #[test]
    fn population_keeps_moving_between_resamples() {
        // Zero returns and an identity matrix give every particle equal
        // fitness, so no resample ever fires; the jitter alone must keep
        // the population exploring.
        let mut alloc = allocator(31);
        let matrix = identity(3);
        let before = alloc.particles.clone();
        let first = alloc.update(&[0.0, 0.0, 0.0], &matrix, 0.99);
        assert!(!first.resampled);
        assert_ne!(alloc.particles, before);

        let second = alloc.update(&[0.0, 0.0, 0.0], &matrix, 0.99);
        assert!(!second.resampled);
        assert_ne!(second.consensus, first.consensus);
        assert_simplex(&second.consensus);
    }

    #[test]
    fn zero_mutation_std_freezes_the_population() {
        let config = ParticleConfig {
            mutation_std: 0.0,
            ..ParticleConfig::default()
        };
        let mut alloc = ParticleAllocator::new(config, roster(3), Some(31));
        let before = alloc.particles.clone();
        let update = alloc.update(&[0.0, 0.0, 0.0], &identity(3), 0.99);
        assert!(!update.resampled);
        assert_eq!(alloc.particles, before);
    }

    // ==================== Penalty coupling ====================

    #[test]
    fn zero_lambda_ignores_correlation_entirely() {
        let config = ParticleConfig {
            lambda_penalty: 0.0,
            ..ParticleConfig::default()
        };
        let mut with_identity =
            ParticleAllocator::new(config.clone(), roster(2), Some(99));
        let mut with_hot_pair = ParticleAllocator::new(config, roster(2), Some(99));

        let identity = identity(2);
        let hot = {
            use capalloc_core::CorrelationConfig;
            let mut tracker = crate::correlation::CorrelationTracker::new(
                CorrelationConfig {
                    shrinkage: 0.0,
                    ..CorrelationConfig::default()
                },
                roster(2),
            );
            let mut sample = std::collections::BTreeMap::new();
            for i in 0..100 {
                let v = (i as f64 * 0.7).sin() * 0.02;
                sample.insert(StrategyId::from("s0"), v);
                sample.insert(StrategyId::from("s1"), v);
                tracker.update(&sample);
            }
            tracker.matrix()
        };
        assert!(hot.get(0, 1) > 0.9);

        for i in 0..150 {
            let r = (i as f64 * 0.5).sin() * 0.02;
            let a = with_identity.update(&[r, r], &identity, 0.99);
            let b = with_hot_pair.update(&[r, r], &hot, 0.99);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn penalty_spreads_weight_off_correlated_pairs() {
        // Three strategies, s0 and s1 perfectly correlated winners, s2 an
        // independent strategy with the same returns. With the penalty on,
        // the filter should prefer s2 over holding both of the twins.
        let mut tracker = {
            use capalloc_core::CorrelationConfig;
            crate::correlation::CorrelationTracker::new(
                CorrelationConfig {
                    shrinkage: 0.0,
                    ..CorrelationConfig::default()
                },
                roster(3),
            )
        };
        let mut sample = std::collections::BTreeMap::new();
        for i in 0..200 {
            let v = (i as f64 * 0.7).sin() * 0.02;
            let w = (i as f64 * 1.9).cos() * 0.02;
            sample.insert(StrategyId::from("s0"), v);
            sample.insert(StrategyId::from("s1"), v);
            sample.insert(StrategyId::from("s2"), w);
            tracker.update(&sample);
        }
        let matrix = tracker.matrix();
        assert!(matrix.get(0, 1) > 0.9);

        let config = ParticleConfig {
            lambda_penalty: 2.0,
            ..ParticleConfig::default()
        };
        let mut penalized = ParticleAllocator::new(config, roster(3), Some(5));
        let mut free = ParticleAllocator::new(
            ParticleConfig {
                lambda_penalty: 0.0,
                ..ParticleConfig::default()
            },
            roster(3),
            Some(5),
        );

        let mut p_last = vec![0.0; 3];
        let mut f_last = vec![0.0; 3];
        for _ in 0..300 {
            p_last = penalized.update(&[0.01, 0.01, 0.01], &matrix, 0.99).consensus;
            f_last = free.update(&[0.01, 0.01, 0.01], &matrix, 0.99).consensus;
        }
        // Equal returns everywhere: only the penalty differentiates, and it
        // punishes the correlated pair.
        assert!(p_last[2] > f_last[2] - 0.05);
        assert!(p_last[2] > p_last[0].min(p_last[1]));
    }

    #[test]
    fn serialized_allocator_resumes_identically() {
        let matrix = identity(3);
        let mut original = allocator(21);
        for i in 0..50 {
            let r = (i as f64 * 0.3).sin() * 0.01;
            original.update(&[r, -r, 0.0], &matrix, 0.99);
        }
        let json = serde_json::to_string(&original).unwrap();
        let mut restored: ParticleAllocator = serde_json::from_str(&json).unwrap();
        for i in 0..50 {
            let r = (i as f64 * 0.3).sin() * 0.01;
            let a = original.update(&[r, -r, 0.0], &matrix, 0.99);
            let b = restored.update(&[r, -r, 0.0], &matrix, 0.99);
            assert_eq!(a, b);
        }
    }
}
