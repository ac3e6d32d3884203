//! Health reporting subsystem.
//!
//! # Data Flow
//! ```text
//! monitor.rs (periodic timer)
//!     → report.rs builds a HealthReport
//!         ← CircuitBreakerManager::get_health_summary
//!         ← RateLimiter::get_usage_stats per configured service
//!     → latest report published for the admin API
//! ```
//!
//! # Design Decisions
//! - Overall status is healthy only when every component is healthy, and
//!   unhealthy when any service usage cannot be read
//! - A component whose state cannot be read is unhealthy; the report
//!   itself is still produced

pub mod monitor;
pub mod report;

pub use monitor::{HealthMonitor, LatestReport};
pub use report::{build_report, HealthReport, HealthStatus, RateLimitHealth};
