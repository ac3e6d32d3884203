//! Resilience layer for calls to external dependencies.
//!
//! Circuit breakers and multi-window rate limiting whose state lives in a
//! shared store, so every process using the same store sees the same
//! breaker state and counts against the same quotas.

pub mod admin;
pub mod config;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod store;

pub use config::schema::{CircuitBreakerConfig, GuardConfig, RateLimitConfig, ServiceLimits};
pub use lifecycle::{Components, Shutdown};
pub use resilience::{CallError, CircuitBreaker, CircuitBreakerError, CircuitBreakerManager, CircuitState, FailureKind};
pub use security::rate_limit::{RateDecision, RateLimiter};
pub use store::SharedStore;
