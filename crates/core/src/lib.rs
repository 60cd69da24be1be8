//! Core types for the adaptive capital-allocation engine.
//!
//! This crate holds everything the numerical engine and its callers share:
//! strategy identifiers, validated configuration structs, the error
//! taxonomy, audit event records, online statistics, and the externally
//! observable [`PortfolioState`](state::PortfolioState).
//!
//! The crate is deliberately free of I/O and of the engine's numerics; it
//! only defines the vocabulary the engine speaks.

pub mod config;
pub mod error;
pub mod events;
pub mod state;
pub mod stats;
pub mod strategy;

pub use config::{
    CircuitBreakerConfig, CorrelationConfig, EngineConfig, KellyConfig, ParticleConfig,
};
pub use error::{ConfigError, StateError};
pub use events::AuditEvent;
pub use state::{
    BreakerStatus, CircuitBreakerState, CorrelationMetrics, KellyDiagnostic, KellyReason,
    PortfolioState, Regime,
};
pub use stats::OnlineStats;
pub use strategy::StrategyId;
