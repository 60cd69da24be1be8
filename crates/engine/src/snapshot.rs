//! Versioned engine persistence.
//!
//! A snapshot captures every component verbatim, including the particle
//! filter's RNG stream, so a restored engine continues the exact
//! trajectory the original would have taken. The pending audit-event
//! queue is deliberately not persisted; events are a drain-once stream.

use serde::{Deserialize, Serialize};

use capalloc_core::{EngineConfig, PortfolioState};

use crate::circuit_breaker::CircuitBreaker;
use crate::correlation::CorrelationTracker;
use crate::kelly::KellyAllocator;
use crate::particle::ParticleAllocator;
use crate::regime::VolatilityRegimeDetector;

/// Snapshot format version this build writes and reads.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Complete serializable engine state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// Format version; restore rejects anything else.
    pub version: u32,
    /// Configuration the engine was running with.
    pub config: EngineConfig,
    /// Correlation tracker state.
    pub correlation: CorrelationTracker,
    /// Circuit breaker state, including the equity peak.
    pub circuit_breaker: CircuitBreaker,
    /// Kelly return windows.
    pub kelly: KellyAllocator,
    /// Particle population, log weights, and RNG stream.
    pub particle: ParticleAllocator,
    /// Volatility regime detector state.
    pub regime: VolatilityRegimeDetector,
    /// Most recently produced portfolio state, if any.
    pub last_state: Option<PortfolioState>,
}
