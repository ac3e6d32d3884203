//! Service health report built from breaker and rate-limit state.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::resilience::clock::Clock;
use crate::resilience::manager::{CircuitBreakerManager, HealthSummary};
use crate::security::rate_limit::{RateLimiter, UsageStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        })
    }
}

/// Rate-limit health of one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RateLimitHealth {
    fn from_usage(usage: UsageStats) -> Self {
        let exhausted = usage.enabled && (usage.remaining_minute == 0 || usage.remaining_daily == 0);
        Self {
            status: if exhausted { HealthStatus::Degraded } else { HealthStatus::Healthy },
            usage: Some(usage),
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Healthy only when every breaker is closed and no service is exhausted;
    /// unhealthy when the shared store cannot be read.
    pub overall_status: HealthStatus,
    pub checked_at: u64,
    pub circuit_breakers: HealthSummary,
    pub rate_limits: BTreeMap<String, RateLimitHealth>,
}

/// Collect breaker and rate-limit health into one report.
pub async fn build_report(
    manager: &CircuitBreakerManager,
    limiter: &RateLimiter,
    clock: &dyn Clock,
) -> HealthReport {
    let circuit_breakers = manager.get_health_summary().await;

    let mut rate_limits = BTreeMap::new();
    for service in limiter.services() {
        let health = match limiter.get_usage_stats(&service).await {
            Ok(usage) => RateLimitHealth::from_usage(usage),
            Err(e) => {
                tracing::error!(service = %service, error = %e, "Rate limit usage check failed");
                RateLimitHealth {
                    status: HealthStatus::Unhealthy,
                    usage: None,
                    error: Some(e.to_string()),
                }
            }
        };
        rate_limits.insert(service, health);
    }

    let unreadable = rate_limits.values().any(|h| h.status == HealthStatus::Unhealthy);
    let all_healthy = circuit_breakers.unhealthy == 0
        && rate_limits.values().all(|h| h.status == HealthStatus::Healthy);

    let overall_status = if unreadable {
        HealthStatus::Unhealthy
    } else if all_healthy {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    HealthReport {
        overall_status,
        checked_at: clock.now_secs(),
        circuit_breakers,
        rate_limits,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::{CircuitBreakerConfig, RateLimitConfig, ServiceLimits};
    use crate::resilience::clock::ManualClock;
    use crate::resilience::failure::FailureKind;
    use crate::store::{MemoryStore, SharedStore};

    #[tokio::test]
    async fn test_report_degrades_with_open_breaker_and_exhausted_quota() {
        let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(3_600.0));
        let manager = CircuitBreakerManager::new(store.clone(), clock.clone());
        let limits = RateLimitConfig::empty()
            .with_service(
                "ai_api",
                ServiceLimits {
                    requests_per_minute: 1,
                    ..ServiceLimits::default()
                },
            )
            .with_service("ocr", ServiceLimits::disabled());
        let limiter = RateLimiter::new(limits, store, clock.clone());

        let report = build_report(&manager, &limiter, clock.as_ref()).await;
        assert_eq!(report.overall_status, HealthStatus::Healthy);
        assert_eq!(report.checked_at, 3_600);

        limiter.check_rate_limit("ai_api", None).await;
        let report = build_report(&manager, &limiter, clock.as_ref()).await;
        assert_eq!(report.overall_status, HealthStatus::Degraded);
        assert_eq!(report.rate_limits["ai_api"].status, HealthStatus::Degraded);
        assert_eq!(report.rate_limits["ocr"].status, HealthStatus::Healthy);

        clock.advance(60.0);
        let breaker = manager
            .get_breaker("ai_api", Some(CircuitBreakerConfig::new("ai_api").with_failure_threshold(1)))
            .await;
        let _ = breaker.call(|| async { Err::<(), _>(FailureKind::Timeout) }).await;
        let report = build_report(&manager, &limiter, clock.as_ref()).await;
        assert_eq!(report.overall_status, HealthStatus::Degraded);
        assert_eq!(report.circuit_breakers.unhealthy, 1);
        assert_eq!(report.rate_limits["ai_api"].status, HealthStatus::Healthy);
    }
}
