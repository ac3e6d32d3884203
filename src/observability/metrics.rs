//! Metrics collection and exposition.
//!
//! # Metrics
//! - `guard_breaker_calls_total` (counter): guarded calls by breaker, outcome
//! - `guard_breaker_rejections_total` (counter): fail-fast rejections
//! - `guard_breaker_transitions_total` (counter): state changes by from/to
//! - `guard_breaker_call_duration_seconds` (histogram): wrapped call latency
//! - `guard_breaker_healthy` (gauge): 1=closed, 0=open or half-open
//! - `guard_rate_limit_decisions_total` (counter): decisions by service, outcome
//! - `guard_rate_limit_failsafe_total` (counter): fail-open decisions
//! - `guard_store_errors_total` (counter): store failures by component
//!
//! Recording is a no-op until a recorder is installed, so library users
//! that never call `init_metrics` pay nothing.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_breaker_call(breaker: &str, outcome: &'static str, elapsed: Duration) {
    counter!("guard_breaker_calls_total", "breaker" => breaker.to_string(), "outcome" => outcome)
        .increment(1);
    histogram!("guard_breaker_call_duration_seconds", "breaker" => breaker.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_breaker_rejection(breaker: &str) {
    counter!("guard_breaker_rejections_total", "breaker" => breaker.to_string()).increment(1);
}

pub fn record_breaker_transition(breaker: &str, from: &'static str, to: &'static str) {
    counter!(
        "guard_breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "from" => from,
        "to" => to
    )
    .increment(1);
}

pub fn record_breaker_health(breaker: &str, healthy: bool) {
    gauge!("guard_breaker_healthy", "breaker" => breaker.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_rate_limit_decision(service: &str, outcome: &'static str) {
    counter!(
        "guard_rate_limit_decisions_total",
        "service" => service.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_rate_limit_failsafe(service: &str) {
    counter!("guard_rate_limit_failsafe_total", "service" => service.to_string()).increment(1);
}

pub fn record_store_error(component: &'static str) {
    counter!("guard_store_errors_total", "component" => component).increment(1);
}
