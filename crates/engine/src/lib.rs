//! Adaptive capital allocation and risk control engine.
//!
//! Combines four components behind one [`PortfolioController`]:
//!
//! - [`CorrelationTracker`]: exponentially weighted cross-strategy
//!   correlation estimation.
//! - [`CircuitBreaker`]: drawdown-driven position sizing and halts.
//! - [`KellyAllocator`]: fractional Kelly scaling per strategy.
//! - [`ParticleAllocator`]: a Bayesian particle filter searching the
//!   weight simplex, with a volatility-adaptive forgetting rate from
//!   [`VolatilityRegimeDetector`].
//!
//! The controller is single-threaded by design; wrap it in a lock if it
//! must be shared. Shared vocabulary types live in `capalloc-core`.

pub mod circuit_breaker;
pub mod controller;
pub mod correlation;
pub mod kelly;
pub mod particle;
pub mod regime;
pub mod snapshot;

pub use circuit_breaker::{BreakerTransition, CircuitBreaker};
pub use controller::PortfolioController;
pub use correlation::{CorrelationMatrix, CorrelationTracker};
pub use kelly::KellyAllocator;
pub use particle::{ParticleAllocator, ParticleUpdate};
pub use regime::VolatilityRegimeDetector;
pub use snapshot::{EngineSnapshot, SNAPSHOT_VERSION};
