//! Portfolio controller: one object, one update path.
//!
//! The controller owns every component and runs them in a fixed order
//! each period, so a given stream of returns and equity snapshots always
//! produces the same sequence of states. Callers interact with exactly
//! three surfaces: `update`, the drained audit-event stream, and
//! snapshot/restore.

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::info;

use capalloc_core::error::{ConfigError, StateError};
use capalloc_core::{
    AuditEvent, CorrelationMetrics, EngineConfig, PortfolioState, StrategyId,
};

use crate::circuit_breaker::CircuitBreaker;
use crate::correlation::CorrelationTracker;
use crate::kelly::KellyAllocator;
use crate::particle::ParticleAllocator;
use crate::regime::VolatilityRegimeDetector;
use crate::snapshot::{EngineSnapshot, SNAPSHOT_VERSION};

/// Kelly reductions larger than this fraction of the raw weight are
/// reported as throttle events.
const THROTTLE_REPORT_CUTOFF: f64 = 0.2;

/// Orchestrates the allocation and risk components over a fixed roster.
#[derive(Debug, Clone)]
pub struct PortfolioController {
    config: EngineConfig,
    correlation: CorrelationTracker,
    breaker: CircuitBreaker,
    kelly: KellyAllocator,
    particle: ParticleAllocator,
    regime: VolatilityRegimeDetector,
    events: Vec<AuditEvent>,
    last_state: Option<PortfolioState>,
}

impl PortfolioController {
    /// Builds a controller from a validated configuration.
    ///
    /// # Errors
    /// Any `ConfigError` from [`EngineConfig::validate`].
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let roster = config.strategies.clone();
        info!(strategies = roster.len(), seed = ?config.seed, "portfolio controller initialized");
        Ok(Self {
            correlation: CorrelationTracker::new(config.correlation.clone(), roster.clone()),
            breaker: CircuitBreaker::new(config.circuit_breaker.clone()),
            kelly: KellyAllocator::new(config.kelly.clone(), &roster),
            particle: ParticleAllocator::new(config.particle.clone(), roster, config.seed),
            regime: VolatilityRegimeDetector::new(),
            events: Vec::new(),
            last_state: None,
            config,
        })
    }

    /// Runs one full allocation period.
    ///
    /// Component order is fixed: correlation, Kelly recording, regime
    /// detection, particle filtering, Kelly scaling, breaker update and
    /// scaling, state assembly. Strategies absent from `returns`
    /// contribute a zero return to the correlation and regime estimates
    /// but are not recorded in their Kelly windows.
    pub fn update(
        &mut self,
        returns: &BTreeMap<StrategyId, f64>,
        equity: Decimal,
    ) -> PortfolioState {
        let now = Utc::now();
        let roster = self.config.strategies.clone();

        // 1.-2. Fold returns into the estimators.
        self.correlation.update(returns);
        for id in &roster {
            if let Some(&ret) = returns.get(id) {
                self.kelly.record(id, ret);
            }
        }

        // Regime detection over the mean portfolio return feeds the
        // particle filter's forgetting rate.
        let ordered: Vec<f64> = roster
            .iter()
            .map(|id| returns.get(id).copied().unwrap_or(0.0))
            .collect();
        let mean_return = ordered.iter().sum::<f64>() / roster.len() as f64;
        let previous_regime = self.regime.regime();
        let current_regime = self.regime.update(mean_return);
        let forgetting_rate = self.regime.forgetting_rate();
        if current_regime != previous_regime {
            self.events.push(AuditEvent::DecayRegimeChange {
                from: previous_regime,
                to: current_regime,
                forgetting_rate,
                timestamp: now,
            });
        }

        // 3. Particle filtering against the current correlation matrix.
        let matrix = self.correlation.matrix();
        let update = self.particle.update(&ordered, &matrix, forgetting_rate);
        if update.resampled {
            self.events.push(AuditEvent::ParticleResample {
                effective_particles: update.effective_particles,
                threshold: self.config.particle.resample_threshold,
                timestamp: now,
            });
        }

        // 4. Kelly scaling of the consensus (renormalizes if over
        //    capital).
        let raw: BTreeMap<StrategyId, f64> = roster
            .iter()
            .cloned()
            .zip(update.consensus.iter().copied())
            .collect();
        let (scaled, diagnostics, fallback) = self.kelly.allocate(&raw);
        if fallback {
            self.events.push(AuditEvent::UniformFallback {
                per_strategy: self.config.kelly.min_allocation,
                strategies: roster.len(),
                timestamp: now,
            });
        }
        for (id, diag) in &diagnostics {
            let raw_weight = raw[id];
            if raw_weight > 0.0 && 1.0 - diag.fraction > THROTTLE_REPORT_CUTOFF {
                self.events.push(AuditEvent::KellyThrottle {
                    strategy: id.clone(),
                    raw_weight,
                    scaled_weight: raw_weight * diag.fraction,
                    reduction: 1.0 - diag.fraction,
                    timestamp: now,
                });
            }
        }

        // 5. This period's equity decides the risk multiplier.
        if let Some(transition) = self.breaker.update(equity) {
            self.events.push(AuditEvent::BreakerTransition {
                from: transition.from,
                to: transition.to,
                drawdown: transition.drawdown,
                timestamp: now,
            });
        }
        let multiplier = self.breaker.multiplier().to_f64().unwrap_or(0.0);
        let final_weights: BTreeMap<StrategyId, f64> = scaled
            .iter()
            .map(|(id, weight)| (id.clone(), weight * multiplier))
            .collect();

        // 6.-7. Assemble the period state.
        let state = PortfolioState {
            timestamp: now,
            correlation: concentration_metrics(&scaled, &matrix),
            final_weights,
            weight_uncertainty: roster
                .iter()
                .cloned()
                .zip(update.uncertainty.iter().copied())
                .collect(),
            effective_particles: update.effective_particles,
            resampled: update.resampled,
            breaker: self.breaker.status(),
            kelly: diagnostics,
            forgetting_rate,
            regime: current_regime,
        };
        self.last_state = Some(state.clone());
        state
    }

    /// Most recent state, if `update` has run at least once.
    #[must_use]
    pub fn state(&self) -> Option<&PortfolioState> {
        self.last_state.as_ref()
    }

    /// Drains the pending audit events, oldest first.
    #[must_use]
    pub fn take_events(&mut self) -> Vec<AuditEvent> {
        std::mem::take(&mut self.events)
    }

    /// Manual circuit-breaker reset; see [`CircuitBreaker::reset`].
    ///
    /// # Errors
    /// `StateError::ResetNotHalted` when the breaker is not halted.
    pub fn reset_breaker(&mut self) -> Result<(), StateError> {
        self.breaker.reset()
    }

    /// Captures the full engine state for persistence.
    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            version: SNAPSHOT_VERSION,
            config: self.config.clone(),
            correlation: self.correlation.clone(),
            circuit_breaker: self.breaker.clone(),
            kelly: self.kelly.clone(),
            particle: self.particle.clone(),
            regime: self.regime.clone(),
            last_state: self.last_state.clone(),
        }
    }

    /// Rebuilds a controller from a snapshot.
    ///
    /// # Errors
    /// - `StateError::UnsupportedSnapshotVersion` for a foreign version.
    /// - `StateError::Config` when the embedded configuration is invalid.
    /// - `StateError::RosterMismatch` when the component rosters disagree
    ///   with the configuration.
    pub fn restore(snapshot: EngineSnapshot) -> Result<Self, StateError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StateError::UnsupportedSnapshotVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        snapshot.config.validate()?;
        let roster = &snapshot.config.strategies;
        if snapshot.particle.ids() != roster.as_slice() {
            return Err(StateError::RosterMismatch {
                detail: format!(
                    "particle roster {:?} differs from configured {:?}",
                    snapshot.particle.ids(),
                    roster
                ),
            });
        }
        if snapshot.correlation.ids() != roster.as_slice() {
            return Err(StateError::RosterMismatch {
                detail: format!(
                    "correlation roster {:?} differs from configured {:?}",
                    snapshot.correlation.ids(),
                    roster
                ),
            });
        }
        info!(strategies = roster.len(), "portfolio controller restored from snapshot");
        Ok(Self {
            config: snapshot.config,
            correlation: snapshot.correlation,
            breaker: snapshot.circuit_breaker,
            kelly: snapshot.kelly,
            particle: snapshot.particle,
            regime: snapshot.regime,
            events: Vec::new(),
            last_state: snapshot.last_state,
        })
    }
}

/// Concentration metrics over the Kelly-scaled weights, normalized so
/// the Herfindahl index reflects shape rather than gross exposure.
fn concentration_metrics(
    scaled: &BTreeMap<StrategyId, f64>,
    matrix: &crate::correlation::CorrelationMatrix,
) -> CorrelationMetrics {
    let total: f64 = scaled.values().sum();
    let herfindahl = if total > 0.0 {
        scaled.values().map(|w| (w / total).powi(2)).sum()
    } else {
        1.0
    };
    CorrelationMetrics {
        herfindahl_index: herfindahl,
        effective_strategies: 1.0 / herfindahl,
        max_pairwise_correlation: matrix.max_pairwise(),
        avg_correlation: matrix.avg_pairwise(),
    }
}
