//! Drawdown circuit breaker.
//!
//! A four-state machine driven by equity drawdown from the running peak.
//! Upgrades (toward Halted) jump directly to the severity the drawdown
//! demands; downgrades step back one level per update and only once the
//! drawdown has cleared the current level's threshold by the hysteresis
//! margin, so the breaker never flaps around a threshold.
//!
//! All arithmetic is `Decimal`; equity is money.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use capalloc_core::error::StateError;
use capalloc_core::{BreakerStatus, CircuitBreakerConfig, CircuitBreakerState};

/// A completed state transition, reported back to the controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerTransition {
    /// State before the equity snapshot.
    pub from: CircuitBreakerState,
    /// State after.
    pub to: CircuitBreakerState,
    /// Drawdown that drove the change.
    pub drawdown: Decimal,
}

/// Drawdown-driven trading circuit breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitBreakerState,
    peak_equity: Decimal,
    drawdown: Decimal,
}

impl CircuitBreaker {
    /// Creates a breaker in the Active state with no equity history.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitBreakerState::Active,
            peak_equity: Decimal::ZERO,
            drawdown: Decimal::ZERO,
        }
    }

    /// Current state-machine position.
    #[must_use]
    pub fn state(&self) -> CircuitBreakerState {
        self.state
    }

    /// Folds one equity snapshot into the breaker.
    ///
    /// Non-positive equity is a data-quality problem, not a portfolio
    /// event: the sample is dropped with a warning and the state is
    /// unchanged. Returns the transition if the state moved.
    pub fn update(&mut self, equity: Decimal) -> Option<BreakerTransition> {
        if equity <= Decimal::ZERO {
            warn!(%equity, "ignoring non-positive equity snapshot");
            return None;
        }

        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
        self.drawdown = (self.peak_equity - equity) / self.peak_equity;

        let from = self.state;
        let demanded = self.demanded_state();
        if demanded.severity() > self.state.severity() {
            self.state = demanded;
        } else if demanded.severity() < self.state.severity() {
            self.try_step_down();
        }

        if self.state == from {
            return None;
        }
        info!(
            from = %from,
            to = %self.state,
            drawdown = %self.drawdown,
            "circuit breaker transition"
        );
        Some(BreakerTransition {
            from,
            to: self.state,
            drawdown: self.drawdown,
        })
    }

    /// Severity the current drawdown calls for, ignoring hysteresis.
    fn demanded_state(&self) -> CircuitBreakerState {
        if self.drawdown >= self.config.halted_drawdown {
            CircuitBreakerState::Halted
        } else if self.drawdown >= self.config.reducing_drawdown {
            CircuitBreakerState::Reducing
        } else if self.drawdown >= self.config.warning_drawdown {
            CircuitBreakerState::Warning
        } else {
            CircuitBreakerState::Active
        }
    }

    /// Steps down one severity level if the hysteresis condition allows.
    fn try_step_down(&mut self) {
        if self.state == CircuitBreakerState::Halted && !self.config.auto_recovery {
            return;
        }
        let entry_threshold = match self.state {
            CircuitBreakerState::Active => return,
            CircuitBreakerState::Warning => self.config.warning_drawdown,
            CircuitBreakerState::Reducing => self.config.reducing_drawdown,
            CircuitBreakerState::Halted => self.config.halted_drawdown,
        };
        if self.drawdown < entry_threshold - self.config.hysteresis_margin {
            self.state = self.state.step_down();
        }
    }

    /// Manual recovery from Halted back to Active.
    ///
    /// The equity peak is retained so the drawdown history survives the
    /// reset; a fresh crash is measured against the same high-water mark.
    ///
    /// # Errors
    /// `StateError::ResetNotHalted` when the breaker is in any other
    /// state.
    pub fn reset(&mut self) -> Result<(), StateError> {
        if self.state != CircuitBreakerState::Halted {
            return Err(StateError::ResetNotHalted {
                current: self.state,
            });
        }
        info!(drawdown = %self.drawdown, "manual circuit breaker reset");
        self.state = CircuitBreakerState::Active;
        Ok(())
    }

    /// Position-size multiplier for the current state.
    #[must_use]
    pub fn multiplier(&self) -> Decimal {
        match self.state {
            CircuitBreakerState::Active => self.config.active_multiplier,
            CircuitBreakerState::Warning => self.config.warning_multiplier,
            CircuitBreakerState::Reducing => self.config.reducing_multiplier,
            CircuitBreakerState::Halted => self.config.halted_multiplier,
        }
    }

    /// Whether new positions may be opened (Active and Warning only).
    #[must_use]
    pub fn can_open_position(&self) -> bool {
        matches!(
            self.state,
            CircuitBreakerState::Active | CircuitBreakerState::Warning
        )
    }

    /// Full status snapshot for reporting.
    #[must_use]
    pub fn status(&self) -> BreakerStatus {
        BreakerStatus {
            state: self.state,
            drawdown: self.drawdown,
            peak_equity: self.peak_equity,
            multiplier: self.multiplier(),
            can_open_position: self.can_open_position(),
        }
    }
}
