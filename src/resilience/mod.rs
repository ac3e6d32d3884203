//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a fallible dependency:
//!     → manager.rs (look up the named breaker, create on first use)
//!     → circuit_breaker.rs (fail fast if open, else run and record outcome)
//!     → failure.rs (classify the error; only expected kinds count)
//!     → store (state shared with every other process)
//! ```
//!
//! # Design Decisions
//! - The breaker never enforces a timeout; callers wrap the operation in
//!   their own deadline (see `CircuitBreaker::advisory_timeout`)
//! - Breakers are owned by the composition root, never global statics
//! - Fallback behavior when blocked belongs to the caller

pub mod circuit_breaker;
pub mod clock;
pub mod failure;
pub mod manager;

pub use circuit_breaker::{
    BreakerHealth, BreakerMetrics, BreakerSnapshot, CallError, CircuitBreaker, CircuitBreakerError,
    CircuitState,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use failure::{classify_status, DependencyFailure, FailureKind};
pub use manager::{CircuitBreakerManager, HealthSummary};
