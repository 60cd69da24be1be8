//! Error taxonomy for the allocation engine.
//!
//! Two fallible surfaces exist: construction (configuration validation)
//! and explicit state operations (`reset`, snapshot restore). Data-quality
//! problems during `update()` are recovered locally and never surface as
//! errors; see the component modules for the fallback rules.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::state::CircuitBreakerState;

/// Rejected configuration. Raised eagerly at construction, never clamped.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    /// The strategy roster is empty.
    #[error("strategy roster cannot be empty")]
    EmptyRoster,

    /// The same strategy id appears twice in the roster.
    #[error("duplicate strategy id '{0}' in roster")]
    DuplicateStrategy(String),

    /// A numeric parameter is outside its documented range.
    #[error("{field} must be in {range}, got {value}")]
    OutOfRange {
        /// Offending field name.
        field: &'static str,
        /// Human-readable valid range.
        range: &'static str,
        /// Rejected value.
        value: f64,
    },

    /// Drawdown thresholds are not strictly increasing in severity.
    #[error(
        "drawdown thresholds must satisfy warning < reducing < halted, \
         got {warning} / {reducing} / {halted}"
    )]
    UnorderedThresholds {
        /// Warning-level drawdown threshold.
        warning: Decimal,
        /// Reducing-level drawdown threshold.
        reducing: Decimal,
        /// Halted-level drawdown threshold.
        halted: Decimal,
    },
}

/// Rejected state operation. The engine's state is unchanged after any of
/// these.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StateError {
    /// `reset()` called while the breaker is not halted.
    #[error("reset is only valid from Halted, current state is {current}")]
    ResetNotHalted {
        /// State the breaker was in when `reset()` was called.
        current: CircuitBreakerState,
    },

    /// Persisted snapshot carries a version this build does not understand.
    #[error("unsupported snapshot version {found}, this engine reads version {expected}")]
    UnsupportedSnapshotVersion {
        /// Version found in the document.
        found: u32,
        /// Version this engine writes and reads.
        expected: u32,
    },

    /// Snapshot was taken for a different strategy roster.
    #[error("snapshot roster does not match configuration: {detail}")]
    RosterMismatch {
        /// What differed between snapshot and configuration.
        detail: String,
    },

    /// Configuration supplied alongside a snapshot failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn config_error_display_names_the_field() {
        let err = ConfigError::OutOfRange {
            field: "decay",
            range: "(0, 1]",
            value: 1.5,
        };
        let msg = err.to_string();
        assert!(msg.contains("decay"));
        assert!(msg.contains("1.5"));
    }

    #[test]
    fn threshold_error_display_lists_all_levels() {
        let err = ConfigError::UnorderedThresholds {
            warning: dec!(0.15),
            reducing: dec!(0.10),
            halted: dec!(0.20),
        };
        let msg = err.to_string();
        assert!(msg.contains("0.15"));
        assert!(msg.contains("0.10"));
        assert!(msg.contains("0.20"));
    }

    #[test]
    fn state_error_wraps_config_error() {
        let err: StateError = ConfigError::EmptyRoster.into();
        assert!(err.to_string().contains("roster"));
    }
}
