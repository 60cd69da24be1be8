//! Typed engine configuration.
//!
//! Every struct here validates eagerly at controller construction:
//! misconfiguration is a [`ConfigError`], never a silent clamp. Defaults
//! match the documented production values.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::strategy::StrategyId;

fn check_range(
    field: &'static str,
    range: &'static str,
    value: f64,
    ok: bool,
) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            range,
            value,
        })
    }
}

// =============================================================================
// Correlation
// =============================================================================

/// Configuration for the online correlation tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// EMA decay for the co-moment update, in `(0, 1]`. Higher = slower
    /// adaptation.
    pub decay: f64,
    /// Linear shrinkage intensity toward the identity matrix, in `[0, 1]`.
    pub shrinkage: f64,
    /// Samples required before the tracker trusts its estimate; identity
    /// is reported until then.
    pub min_samples: usize,
    /// Numerical floor for variances and the matrix eigenvalue bound.
    pub epsilon: f64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            decay: 0.99,
            shrinkage: 0.1,
            min_samples: 30,
            epsilon: 1e-6,
        }
    }
}

impl CorrelationConfig {
    /// Validates all fields.
    ///
    /// # Errors
    /// Returns `ConfigError::OutOfRange` for any field outside its
    /// documented range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("correlation.decay", "(0, 1]", self.decay, {
            self.decay > 0.0 && self.decay <= 1.0
        })?;
        check_range("correlation.shrinkage", "[0, 1]", self.shrinkage, {
            (0.0..=1.0).contains(&self.shrinkage)
        })?;
        check_range(
            "correlation.min_samples",
            ">= 1",
            self.min_samples as f64,
            self.min_samples >= 1,
        )?;
        check_range(
            "correlation.epsilon",
            "(0, 1)",
            self.epsilon,
            self.epsilon > 0.0 && self.epsilon < 1.0,
        )?;
        Ok(())
    }
}

// =============================================================================
// Circuit breaker
// =============================================================================

/// Configuration for the drawdown circuit breaker.
///
/// Thresholds are drawdown fractions (0.10 = 10%) and must be strictly
/// increasing in severity. All money arithmetic downstream is `Decimal`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Drawdown at which the breaker enters Warning.
    pub warning_drawdown: Decimal,
    /// Drawdown at which the breaker enters Reducing.
    pub reducing_drawdown: Decimal,
    /// Drawdown at which the breaker enters Halted.
    pub halted_drawdown: Decimal,
    /// Recovery hysteresis: a downgrade fires only once drawdown falls
    /// below the current state's threshold minus this margin.
    pub hysteresis_margin: Decimal,
    /// Position-size multiplier in Active.
    pub active_multiplier: Decimal,
    /// Position-size multiplier in Warning (informational by default).
    pub warning_multiplier: Decimal,
    /// Position-size multiplier in Reducing.
    pub reducing_multiplier: Decimal,
    /// Position-size multiplier in Halted.
    pub halted_multiplier: Decimal,
    /// Whether Halted may downgrade implicitly under the hysteresis rule.
    /// When false, only an explicit `reset()` leaves Halted.
    pub auto_recovery: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            warning_drawdown: dec!(0.10),
            reducing_drawdown: dec!(0.15),
            halted_drawdown: dec!(0.20),
            hysteresis_margin: dec!(0.05),
            active_multiplier: dec!(1.0),
            warning_multiplier: dec!(1.0),
            reducing_multiplier: dec!(0.5),
            halted_multiplier: dec!(0.0),
            auto_recovery: false,
        }
    }
}

impl CircuitBreakerConfig {
    /// Builder method to set the three drawdown thresholds.
    #[must_use]
    pub fn with_thresholds(mut self, warning: Decimal, reducing: Decimal, halted: Decimal) -> Self {
        self.warning_drawdown = warning;
        self.reducing_drawdown = reducing;
        self.halted_drawdown = halted;
        self
    }

    /// Builder method to set the hysteresis margin.
    #[must_use]
    pub fn with_hysteresis_margin(mut self, margin: Decimal) -> Self {
        self.hysteresis_margin = margin;
        self
    }

    /// Builder method to enable automatic recovery from Halted.
    #[must_use]
    pub fn with_auto_recovery(mut self, enabled: bool) -> Self {
        self.auto_recovery = enabled;
        self
    }

    /// Validates threshold ordering, margin, and multipliers.
    ///
    /// # Errors
    /// Returns `ConfigError::UnorderedThresholds` when the thresholds are
    /// not strictly increasing, and `ConfigError::OutOfRange` for values
    /// outside their documented ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.warning_drawdown < self.reducing_drawdown
            && self.reducing_drawdown < self.halted_drawdown)
        {
            return Err(ConfigError::UnorderedThresholds {
                warning: self.warning_drawdown,
                reducing: self.reducing_drawdown,
                halted: self.halted_drawdown,
            });
        }
        for (field, value) in [
            ("breaker.warning_drawdown", self.warning_drawdown),
            ("breaker.reducing_drawdown", self.reducing_drawdown),
            ("breaker.halted_drawdown", self.halted_drawdown),
        ] {
            check_range(field, "(0, 1)", dec_to_f64(value), {
                value > Decimal::ZERO && value < Decimal::ONE
            })?;
        }
        check_range(
            "breaker.hysteresis_margin",
            "[0, 1)",
            dec_to_f64(self.hysteresis_margin),
            self.hysteresis_margin >= Decimal::ZERO && self.hysteresis_margin < Decimal::ONE,
        )?;
        for (field, value) in [
            ("breaker.active_multiplier", self.active_multiplier),
            ("breaker.warning_multiplier", self.warning_multiplier),
            ("breaker.reducing_multiplier", self.reducing_multiplier),
            ("breaker.halted_multiplier", self.halted_multiplier),
        ] {
            check_range(field, "[0, 1]", dec_to_f64(value), {
                value >= Decimal::ZERO && value <= Decimal::ONE
            })?;
        }
        Ok(())
    }
}

fn dec_to_f64(value: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    value.to_f64().unwrap_or(f64::NAN)
}

// =============================================================================
// Kelly
// =============================================================================

/// Configuration for the fractional-Kelly allocator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KellyConfig {
    /// Master switch; when false every fraction is a neutral 1.0.
    pub enabled: bool,
    /// Fraction of full Kelly to apply (0.25 = quarter Kelly), in `[0, 1]`.
    pub beta: f64,
    /// Samples required before any scaling is applied.
    pub min_samples: usize,
    /// Samples at which the confidence ramp reaches 1.0.
    pub max_samples: usize,
    /// Upper bound for the final fraction (and the degenerate-variance cap).
    pub max_fraction: f64,
    /// Exponential weighting decay for the windowed mean/variance.
    pub decay: f64,
    /// Uniform per-strategy allocation used when every fraction is zero.
    pub min_allocation: f64,
    /// Confidence assigned right at `min_samples` when the uncertainty
    /// adjustment is enabled.
    pub min_confidence: f64,
    /// Whether to scale fractions by the sample-size confidence ramp.
    pub uncertainty_adjustment: bool,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            beta: 0.25,
            min_samples: 30,
            max_samples: 180,
            max_fraction: 1.0,
            decay: 0.99,
            min_allocation: 0.01,
            min_confidence: 0.5,
            uncertainty_adjustment: true,
        }
    }
}

impl KellyConfig {
    /// Return window capacity: six times the minimum sample requirement.
    #[must_use]
    pub fn window_capacity(&self) -> usize {
        self.min_samples * 6
    }

    /// Validates all fields.
    ///
    /// # Errors
    /// Returns `ConfigError::OutOfRange` for any field outside its
    /// documented range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("kelly.beta", "[0, 1]", self.beta, {
            (0.0..=1.0).contains(&self.beta)
        })?;
        check_range(
            "kelly.min_samples",
            ">= 1",
            self.min_samples as f64,
            self.min_samples >= 1,
        )?;
        check_range(
            "kelly.max_samples",
            ">= min_samples",
            self.max_samples as f64,
            self.max_samples >= self.min_samples,
        )?;
        check_range(
            "kelly.max_fraction",
            "> 0",
            self.max_fraction,
            self.max_fraction > 0.0,
        )?;
        check_range("kelly.decay", "(0, 1]", self.decay, {
            self.decay > 0.0 && self.decay <= 1.0
        })?;
        check_range(
            "kelly.min_allocation",
            "(0, 1]",
            self.min_allocation,
            self.min_allocation > 0.0 && self.min_allocation <= 1.0,
        )?;
        check_range(
            "kelly.min_confidence",
            "(0, 1]",
            self.min_confidence,
            self.min_confidence > 0.0 && self.min_confidence <= 1.0,
        )?;
        Ok(())
    }
}

// =============================================================================
// Particles
// =============================================================================

/// Configuration for the Bayesian particle allocator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleConfig {
    /// Population size M.
    pub particle_count: usize,
    /// Strength of the covariance penalty. Zero reproduces the
    /// correlation-unaware baseline exactly.
    pub lambda_penalty: f64,
    /// Resample when effective particles fall below this fraction of M.
    pub resample_threshold: f64,
    /// Standard deviation of the Gaussian weight mutation.
    pub mutation_std: f64,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            particle_count: 100,
            lambda_penalty: 0.5,
            resample_threshold: 0.5,
            mutation_std: 0.1,
        }
    }
}

impl ParticleConfig {
    /// Validates all fields.
    ///
    /// # Errors
    /// Returns `ConfigError::OutOfRange` for any field outside its
    /// documented range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "particle.particle_count",
            ">= 2",
            self.particle_count as f64,
            self.particle_count >= 2,
        )?;
        check_range(
            "particle.lambda_penalty",
            ">= 0",
            self.lambda_penalty,
            self.lambda_penalty >= 0.0,
        )?;
        check_range(
            "particle.resample_threshold",
            "(0, 1]",
            self.resample_threshold,
            self.resample_threshold > 0.0 && self.resample_threshold <= 1.0,
        )?;
        check_range(
            "particle.mutation_std",
            ">= 0",
            self.mutation_std,
            self.mutation_std >= 0.0,
        )?;
        Ok(())
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Full engine configuration: the strategy roster plus one config per
/// component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Strategies the engine allocates across. Fixed for the lifetime of
    /// a controller instance.
    pub strategies: Vec<StrategyId>,
    /// Correlation tracker settings.
    pub correlation: CorrelationConfig,
    /// Circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Kelly allocator settings.
    pub kelly: KellyConfig,
    /// Particle allocator settings.
    pub particle: ParticleConfig,
    /// Seed for the particle filter's randomness source. `None` draws
    /// from entropy; set it for reproducible runs.
    pub seed: Option<u64>,
}

impl EngineConfig {
    /// Creates a configuration with default component settings for the
    /// given roster.
    #[must_use]
    pub fn new(strategies: Vec<StrategyId>) -> Self {
        Self {
            strategies,
            correlation: CorrelationConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            kelly: KellyConfig::default(),
            particle: ParticleConfig::default(),
            seed: None,
        }
    }

    /// Validates the roster and every component configuration.
    ///
    /// # Errors
    /// Returns the first `ConfigError` encountered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.strategies.is_empty() {
            return Err(ConfigError::EmptyRoster);
        }
        for (i, id) in self.strategies.iter().enumerate() {
            if self.strategies[..i].contains(id) {
                return Err(ConfigError::DuplicateStrategy(id.to_string()));
            }
        }
        self.correlation.validate()?;
        self.circuit_breaker.validate()?;
        self.kelly.validate()?;
        self.particle.validate()?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
