//! Admission control subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call to a metered service:
//!     → rate_limit.rs (minute → day → burst, first exhausted window denies)
//!     → admitted: counters incremented, caller proceeds to the breaker
//!     → denied: caller degrades (cached or heuristic result)
//! ```
//!
//! # Design Decisions
//! - Reacts to volume, not failures; independent of the circuit breaker
//! - Fail open: a broken limiter means no limiting, never an outage
//! - Fixed windows; counters expire through store TTLs

pub mod rate_limit;

pub use rate_limit::{DecisionReason, RateDecision, RateLimiter, UsageStats, Window};
