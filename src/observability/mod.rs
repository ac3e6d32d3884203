//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! resilience / security / health produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, plain or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields (breaker, service, state) on every event
//! - Metrics are cheap and optional; nothing breaks without an exporter

pub mod logging;
pub mod metrics;
