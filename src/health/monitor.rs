//! Periodic health reporting.
//!
//! # Responsibilities
//! - Rebuild the health report on an interval
//! - Keep the latest report for the admin API
//! - Log when the guarded services are not healthy

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::health::report::{build_report, HealthReport, HealthStatus};
use crate::observability::metrics;
use crate::resilience::circuit_breaker::CircuitState;
use crate::resilience::clock::Clock;
use crate::resilience::manager::CircuitBreakerManager;
use crate::security::rate_limit::RateLimiter;

/// Latest report, shared between the monitor and its readers.
pub type LatestReport = Arc<ArcSwapOption<HealthReport>>;

pub struct HealthMonitor {
    manager: Arc<CircuitBreakerManager>,
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    config: HealthCheckConfig,
    latest: LatestReport,
}

impl HealthMonitor {
    pub fn new(
        manager: Arc<CircuitBreakerManager>,
        limiter: Arc<RateLimiter>,
        clock: Arc<dyn Clock>,
        config: HealthCheckConfig,
    ) -> Self {
        Self {
            manager,
            limiter,
            clock,
            config,
            latest: Arc::new(ArcSwapOption::empty()),
        }
    }

    /// Handle to the most recent report.
    pub fn latest(&self) -> LatestReport {
        self.latest.clone()
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Health monitor disabled");
            return;
        }

        tracing::info!(interval = self.config.interval_secs, "Health monitor starting");

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_once().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Build one report and publish it.
    pub async fn check_once(&self) -> Arc<HealthReport> {
        let report = Arc::new(build_report(&self.manager, &self.limiter, self.clock.as_ref()).await);

        for (name, state) in &report.circuit_breakers.breakers {
            metrics::record_breaker_health(name, *state == CircuitState::Closed);
        }

        if report.overall_status != HealthStatus::Healthy {
            tracing::warn!(
                status = %report.overall_status,
                unhealthy_breakers = report.circuit_breakers.unhealthy,
                "Guarded services health check"
            );
        } else {
            tracing::debug!("Guarded services healthy");
        }

        self.latest.store(Some(report.clone()));
        report
    }
}
