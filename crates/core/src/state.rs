//! Externally observable state types.
//!
//! [`PortfolioState`] is the immutable-once-returned output of one
//! controller update. Everything here is plain data with serde support so
//! callers can log, display, or persist it without touching the engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::strategy::StrategyId;

// =============================================================================
// Circuit breaker
// =============================================================================

/// Drawdown state machine position, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitBreakerState {
    /// Normal operation, full sizing.
    Active,
    /// Drawdown past the first threshold; informational by default.
    Warning,
    /// Drawdown past the second threshold; sizing reduced, no new entries.
    Reducing,
    /// Drawdown past the final threshold; trading halted.
    Halted,
}

impl CircuitBreakerState {
    /// Severity rank used for transition comparisons (Active lowest).
    #[must_use]
    pub fn severity(self) -> u8 {
        match self {
            Self::Active => 0,
            Self::Warning => 1,
            Self::Reducing => 2,
            Self::Halted => 3,
        }
    }

    /// The next lower-severity state, used for stepwise recovery.
    #[must_use]
    pub fn step_down(self) -> Self {
        match self {
            Self::Active | Self::Warning => Self::Active,
            Self::Reducing => Self::Warning,
            Self::Halted => Self::Reducing,
        }
    }
}

impl fmt::Display for CircuitBreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "ACTIVE",
            Self::Warning => "WARNING",
            Self::Reducing => "REDUCING",
            Self::Halted => "HALTED",
        };
        f.write_str(s)
    }
}

/// Circuit breaker status as reported in [`PortfolioState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerStatus {
    /// Current state-machine position.
    pub state: CircuitBreakerState,
    /// Current drawdown from peak, as a decimal fraction.
    pub drawdown: Decimal,
    /// High-water mark of equity (never decreases).
    pub peak_equity: Decimal,
    /// Position-size multiplier applied to final weights.
    pub multiplier: Decimal,
    /// Whether new entries are permitted (false in Reducing/Halted).
    pub can_open_position: bool,
}

// =============================================================================
// Correlation
// =============================================================================

/// Portfolio concentration and correlation metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMetrics {
    /// Sum of squared weights; 1/N for equal weights, 1.0 when concentrated.
    pub herfindahl_index: f64,
    /// 1 / Herfindahl: effective number of equally-weighted strategies.
    pub effective_strategies: f64,
    /// Largest absolute off-diagonal correlation.
    pub max_pairwise_correlation: f64,
    /// Mean off-diagonal correlation.
    pub avg_correlation: f64,
}

// =============================================================================
// Kelly
// =============================================================================

/// Why a Kelly fraction came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KellyReason {
    /// Kelly scaling disabled in configuration; fraction is 1.0.
    Disabled,
    /// Fewer samples than `min_samples`; neutral fraction 1.0 applied.
    InsufficientData,
    /// Weighted mean return is non-positive; fraction forced to 0.
    NegativeMean,
    /// Variance below the numerical floor; fraction capped at `max_fraction`.
    VarianceFloor,
    /// Normal growth-optimal scaling.
    Scaled,
}

/// Per-strategy Kelly diagnostic reported in [`PortfolioState`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KellyDiagnostic {
    /// Final fraction in `[0, max_fraction]` before cross-strategy
    /// normalization.
    pub fraction: f64,
    /// How the fraction was derived.
    pub reason: KellyReason,
    /// Samples currently in the return window.
    pub sample_size: usize,
    /// Confidence factor applied (1.0 when fully ramped or disabled).
    pub confidence: f64,
}

// =============================================================================
// Volatility regime
// =============================================================================

/// Volatility regime derived from the fast/slow variance ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regime {
    /// Fast variance well below slow; stable, slow forgetting.
    Calm,
    /// Fast and slow variance in balance.
    Normal,
    /// Fast variance well above slow; faster forgetting.
    Volatile,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Calm => "calm",
            Self::Normal => "normal",
            Self::Volatile => "volatile",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Portfolio state
// =============================================================================

/// Output of one controller update.
///
/// Immutable once returned; repeated reads between updates observe
/// identical values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    /// When this state was assembled.
    pub timestamp: DateTime<Utc>,
    /// Final per-strategy capital weights after Kelly and breaker scaling.
    /// Sums to at most 1.
    pub final_weights: BTreeMap<StrategyId, f64>,
    /// Per-strategy weight variance across the particle population.
    pub weight_uncertainty: BTreeMap<StrategyId, f64>,
    /// Effective particle count, in `(1, M]` for a live population.
    pub effective_particles: f64,
    /// Whether the particle population was resampled this period.
    pub resampled: bool,
    /// Concentration and correlation metrics for the final weights.
    pub correlation: CorrelationMetrics,
    /// Circuit breaker status after this period's equity snapshot.
    pub breaker: BreakerStatus,
    /// Per-strategy Kelly diagnostics.
    pub kelly: BTreeMap<StrategyId, KellyDiagnostic>,
    /// Forgetting rate the particle filter used this period.
    pub forgetting_rate: f64,
    /// Volatility regime driving the forgetting rate.
    pub regime: Regime,
}
