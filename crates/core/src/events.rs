//! Audit event records.
//!
//! Structured records for the observability stream: the engine appends
//! them during `update()` and the caller drains them via
//! `PortfolioController::take_events`. The engine never writes them
//! anywhere itself.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::state::{CircuitBreakerState, Regime};
use crate::strategy::StrategyId;

/// One structured audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AuditEvent {
    /// The circuit breaker moved between states.
    BreakerTransition {
        /// State before this period's equity snapshot.
        from: CircuitBreakerState,
        /// State after.
        to: CircuitBreakerState,
        /// Drawdown that drove the transition.
        drawdown: Decimal,
        /// When the transition was observed.
        timestamp: DateTime<Utc>,
    },

    /// Kelly scaling cut a strategy's raw weight by more than 20%.
    KellyThrottle {
        /// Strategy whose weight was reduced.
        strategy: StrategyId,
        /// Raw particle-consensus weight before Kelly scaling.
        raw_weight: f64,
        /// Weight after Kelly scaling.
        scaled_weight: f64,
        /// Relative reduction, in `(0.2, 1.0]`.
        reduction: f64,
        /// When the reduction was applied.
        timestamp: DateTime<Utc>,
    },

    /// Every strategy's Kelly fraction was zero; the allocator fell back
    /// to a uniform minimum allocation to preserve diversification.
    UniformFallback {
        /// Allocation given to each strategy.
        per_strategy: f64,
        /// Number of strategies covered by the fallback.
        strategies: usize,
        /// When the fallback fired.
        timestamp: DateTime<Utc>,
    },

    /// Particle diversity collapsed and the population was resampled.
    ParticleResample {
        /// Effective particle count that triggered the resample.
        effective_particles: f64,
        /// Trigger threshold (fraction of the population size).
        threshold: f64,
        /// When the resample ran.
        timestamp: DateTime<Utc>,
    },

    /// The volatility regime changed, moving the forgetting rate.
    DecayRegimeChange {
        /// Previous regime.
        from: Regime,
        /// New regime.
        to: Regime,
        /// Forgetting rate now in effect.
        forgetting_rate: f64,
        /// When the change was detected.
        timestamp: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn events_round_trip_through_json() {
        let event = AuditEvent::BreakerTransition {
            from: CircuitBreakerState::Active,
            to: CircuitBreakerState::Reducing,
            drawdown: dec!(0.16),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: AuditEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn throttle_event_carries_strategy_id() {
        let event = AuditEvent::KellyThrottle {
            strategy: StrategyId::from("momentum"),
            raw_weight: 0.4,
            scaled_weight: 0.1,
            reduction: 0.75,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("momentum"));
    }
}
