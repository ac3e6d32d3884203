//! Fixed-window rate limiting for outbound calls to metered services.
//!
//! Three windows are checked in order: minute, day, then a 10 second burst
//! window optionally scoped to a caller identity. The first exhausted
//! window denies the call and later windows are not read. An admitted call
//! increments all three counters.
//!
//! # Store Layout
//! ```text
//! rate_limit:{service}:minute:{t / 60}             TTL 120s
//! rate_limit:{service}:day:{t / 86400}             TTL 90000s
//! rate_limit:{service}:burst:{t / 10}[:{identity}] TTL 20s
//! ```
//!
//! Any store failure fails open: the call is allowed and the decision is
//! flagged `failsafe`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::config::{RateLimitConfig, ServiceLimits};
use crate::observability::metrics;
use crate::resilience::clock::Clock;
use crate::store::{self, SharedStore, StoreError};

/// A counting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Window {
    Minute,
    Daily,
    Burst,
}

impl Window {
    /// Window width in seconds.
    pub fn width(&self) -> u64 {
        match self {
            Window::Minute => 60,
            Window::Daily => 86_400,
            Window::Burst => 10,
        }
    }

    /// Counter lifetime; outlives the window so a late writer cannot
    /// recreate a bucket that already expired.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(match self {
            Window::Minute => 120,
            Window::Daily => 90_000,
            Window::Burst => 20,
        })
    }

    fn key_segment(&self) -> &'static str {
        match self {
            Window::Minute => "minute",
            Window::Daily => "day",
            Window::Burst => "burst",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Window::Minute => "minute",
            Window::Daily => "daily",
            Window::Burst => "burst",
        }
    }

    fn exceeded(&self) -> DecisionReason {
        match self {
            Window::Minute => DecisionReason::MinuteLimitExceeded,
            Window::Daily => DecisionReason::DailyLimitExceeded,
            Window::Burst => DecisionReason::BurstLimitExceeded,
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucket index of `now` for a window.
pub fn bucket(now: u64, window: Window) -> u64 {
    now / window.width()
}

/// Seconds until the current bucket of `window` rolls over. Always in `1..=width`.
pub fn reset_in(now: u64, window: Window) -> u64 {
    window.width() - (now % window.width())
}

/// Store key of the counter covering `now`.
pub fn counter_key(service: &str, window: Window, now: u64, identity: Option<&str>) -> String {
    let mut key = format!("rate_limit:{}:{}:{}", service, window.key_segment(), bucket(now, window));
    if let (Window::Burst, Some(identity)) = (window, identity) {
        key.push(':');
        key.push_str(identity);
    }
    key
}

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    NoLimitsConfigured,
    RateLimitingDisabled,
    MinuteLimitExceeded,
    DailyLimitExceeded,
    BurstLimitExceeded,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::NoLimitsConfigured => "no_limits_configured",
            DecisionReason::RateLimitingDisabled => "rate_limiting_disabled",
            DecisionReason::MinuteLimitExceeded => "minute_limit_exceeded",
            DecisionReason::DailyLimitExceeded => "daily_limit_exceeded",
            DecisionReason::BurstLimitExceeded => "burst_limit_exceeded",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an admission check. A denial is data, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateDecision {
    pub allowed: bool,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DecisionReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<Window>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_minute: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_daily: Option<u64>,
    /// Set when the limiter itself failed and let the call through.
    #[serde(default)]
    pub failsafe: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RateDecision {
    fn base(service: &str, allowed: bool) -> Self {
        Self {
            allowed,
            service: service.to_string(),
            reason: None,
            limit: None,
            current: None,
            reset_in: None,
            window: None,
            identity: None,
            remaining_minute: None,
            remaining_daily: None,
            failsafe: false,
            error: None,
        }
    }

    fn pass_through(service: &str, reason: DecisionReason) -> Self {
        Self {
            reason: Some(reason),
            ..Self::base(service, true)
        }
    }

    fn denied(service: &str, window: Window, limit: u64, current: u64, now: u64, identity: Option<&str>) -> Self {
        Self {
            reason: Some(window.exceeded()),
            limit: Some(limit),
            current: Some(current),
            reset_in: Some(reset_in(now, window)),
            window: Some(window),
            identity: identity.map(str::to_string),
            ..Self::base(service, false)
        }
    }

    fn admitted(service: &str, identity: Option<&str>, remaining_minute: u64, remaining_daily: u64) -> Self {
        Self {
            identity: identity.map(str::to_string),
            remaining_minute: Some(remaining_minute),
            remaining_daily: Some(remaining_daily),
            ..Self::base(service, true)
        }
    }

    fn failsafe(service: &str, error: &StoreError) -> Self {
        Self {
            failsafe: true,
            error: Some(error.to_string()),
            ..Self::base(service, true)
        }
    }
}

/// Current usage of a service, read without admitting anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub service: String,
    pub enabled: bool,
    pub current_minute: u64,
    pub limit_minute: u64,
    pub remaining_minute: u64,
    pub current_daily: u64,
    pub limit_daily: u64,
    pub remaining_daily: u64,
    pub timestamp: u64,
}

/// Multi-window rate limiter over a shared store.
pub struct RateLimiter {
    store: Arc<dyn SharedStore>,
    clock: Arc<dyn Clock>,
    limits: ArcSwap<RateLimitConfig>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, store: Arc<dyn SharedStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            limits: ArcSwap::from_pointee(config),
        }
    }

    /// Swap in new limits. Counters are untouched.
    pub fn update_limits(&self, config: RateLimitConfig) {
        tracing::info!(services = config.services.len(), "Rate limits updated");
        self.limits.store(Arc::new(config));
    }

    pub fn service_limits(&self, service: &str) -> Option<ServiceLimits> {
        self.limits.load().services.get(service).cloned()
    }

    pub fn is_rate_limiting_enabled(&self, service: &str) -> bool {
        self.service_limits(service).is_some_and(|l| l.enabled)
    }

    /// Names of every configured service.
    pub fn services(&self) -> Vec<String> {
        self.limits.load().services.keys().cloned().collect()
    }

    /// Decide whether one call to `service` may proceed, recording it if so.
    pub async fn check_rate_limit(&self, service: &str, identity: Option<&str>) -> RateDecision {
        let limits = match self.service_limits(service) {
            None => return RateDecision::pass_through(service, DecisionReason::NoLimitsConfigured),
            Some(l) if !l.enabled => {
                return RateDecision::pass_through(service, DecisionReason::RateLimitingDisabled)
            }
            Some(l) => l,
        };

        let now = self.clock.now_secs();
        match self.evaluate(service, identity, &limits, now).await {
            Ok(decision) => {
                if decision.allowed {
                    metrics::record_rate_limit_decision(service, "allowed");
                } else {
                    metrics::record_rate_limit_decision(service, "denied");
                    tracing::warn!(
                        service,
                        identity = identity.unwrap_or("system"),
                        reason = ?decision.reason,
                        current = ?decision.current,
                        limit = ?decision.limit,
                        "Rate limit exceeded"
                    );
                }
                decision
            }
            Err(e) => {
                metrics::record_store_error("rate_limiter");
                metrics::record_rate_limit_failsafe(service);
                tracing::error!(
                    service,
                    backend = self.store.backend_name(),
                    error = %e,
                    "Rate limit check failed; allowing request"
                );
                RateDecision::failsafe(service, &e)
            }
        }
    }

    async fn evaluate(
        &self,
        service: &str,
        identity: Option<&str>,
        limits: &ServiceLimits,
        now: u64,
    ) -> Result<RateDecision, StoreError> {
        let store = self.store.as_ref();
        let checks = [
            (Window::Minute, limits.requests_per_minute),
            (Window::Daily, limits.requests_per_day),
            (Window::Burst, limits.burst_limit),
        ];

        for (window, limit) in checks {
            let key = counter_key(service, window, now, identity);
            let current = store::get_counter(store, &key).await?;
            if current >= limit {
                return Ok(RateDecision::denied(service, window, limit, current, now, identity));
            }
        }

        let minute = store
            .incr(&counter_key(service, Window::Minute, now, None), Some(Window::Minute.ttl()))
            .await?;
        let day = store
            .incr(&counter_key(service, Window::Daily, now, None), Some(Window::Daily.ttl()))
            .await?;
        let burst = store
            .incr(&counter_key(service, Window::Burst, now, identity), Some(Window::Burst.ttl()))
            .await?;

        tracing::debug!(service, minute, day, burst, "Rate limit recorded");

        Ok(RateDecision::admitted(
            service,
            identity,
            limits.requests_per_minute.saturating_sub(minute),
            limits.requests_per_day.saturating_sub(day),
        ))
    }

    /// Minute and day usage for a service. Unknown services report zero limits.
    pub async fn get_usage_stats(&self, service: &str) -> Result<UsageStats, StoreError> {
        let now = self.clock.now_secs();
        let limits = self.service_limits(service);
        let store = self.store.as_ref();

        let current_minute = store::get_counter(store, &counter_key(service, Window::Minute, now, None)).await?;
        let current_daily = store::get_counter(store, &counter_key(service, Window::Daily, now, None)).await?;

        let (enabled, limit_minute, limit_daily) = match &limits {
            Some(l) => (l.enabled, l.requests_per_minute, l.requests_per_day),
            None => (false, 0, 0),
        };

        Ok(UsageStats {
            service: service.to_string(),
            enabled,
            current_minute,
            limit_minute,
            remaining_minute: limit_minute.saturating_sub(current_minute),
            current_daily,
            limit_daily,
            remaining_daily: limit_daily.saturating_sub(current_daily),
            timestamp: now,
        })
    }

    /// Clear the current minute and day counters of a service.
    ///
    /// Burst counters are removed by pattern when the store supports it and
    /// otherwise left to expire.
    pub async fn reset_limits(&self, service: &str) -> Result<(), StoreError> {
        let now = self.clock.now_secs();
        let store = self.store.as_ref();

        store.delete(&counter_key(service, Window::Minute, now, None)).await?;
        store.delete(&counter_key(service, Window::Daily, now, None)).await?;

        if store.supports_pattern_delete() {
            let pattern = format!("rate_limit:{}:burst:*", service);
            let removed = store.delete_pattern(&pattern).await?;
            tracing::debug!(service, removed, "Burst counters cleared");
        } else {
            tracing::warn!(
                service,
                backend = store.backend_name(),
                "Pattern deletion not supported; burst counters will expire on their own"
            );
        }

        tracing::info!(service, "Rate limits reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::clock::ManualClock;
    use crate::store::MemoryStore;

    #[test]
    fn test_bucket_arithmetic() {
        assert_eq!(bucket(119, Window::Minute), 1);
        assert_eq!(bucket(120, Window::Minute), 2);
        assert_eq!(reset_in(120, Window::Minute), 60);
        assert_eq!(reset_in(179, Window::Minute), 1);
        assert_eq!(reset_in(86_399, Window::Daily), 1);
        assert_eq!(reset_in(25, Window::Burst), 5);
    }

    #[test]
    fn test_counter_keys() {
        assert_eq!(counter_key("ai", Window::Minute, 125, Some("u")), "rate_limit:ai:minute:2");
        assert_eq!(counter_key("ai", Window::Daily, 90_000, None), "rate_limit:ai:day:1");
        assert_eq!(counter_key("ai", Window::Burst, 25, None), "rate_limit:ai:burst:2");
        assert_eq!(counter_key("ai", Window::Burst, 25, Some("u-1")), "rate_limit:ai:burst:2:u-1");
    }

    fn limiter(limits: ServiceLimits) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_200.0));
        let config = RateLimitConfig::empty().with_service("ai", limits);
        (RateLimiter::new(config, Arc::new(MemoryStore::new()), clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_daily_limit_checked_after_minute() {
        let (rl, clock) = limiter(ServiceLimits {
            enabled: true,
            requests_per_minute: 2,
            requests_per_day: 3,
            burst_limit: 10,
        });

        assert!(rl.check_rate_limit("ai", None).await.allowed);
        assert!(rl.check_rate_limit("ai", None).await.allowed);
        let d = rl.check_rate_limit("ai", None).await;
        assert_eq!(d.reason, Some(DecisionReason::MinuteLimitExceeded));

        clock.advance(60.0);
        assert!(rl.check_rate_limit("ai", None).await.allowed);
        let d = rl.check_rate_limit("ai", None).await;
        assert!(!d.allowed);
        assert_eq!(d.reason, Some(DecisionReason::DailyLimitExceeded));
        assert_eq!(d.window, Some(Window::Daily));
        assert_eq!(d.limit, Some(3));
        assert_eq!(d.current, Some(3));
    }

    #[tokio::test]
    async fn test_admitted_reports_remaining() {
        let (rl, _) = limiter(ServiceLimits {
            enabled: true,
            requests_per_minute: 10,
            requests_per_day: 100,
            burst_limit: 5,
        });
        let d = rl.check_rate_limit("ai", Some("user-1")).await;
        assert!(d.allowed);
        assert!(!d.failsafe);
        assert_eq!(d.remaining_minute, Some(9));
        assert_eq!(d.remaining_daily, Some(99));
    }

    #[tokio::test]
    async fn test_usage_stats_and_reset() {
        let (rl, _) = limiter(ServiceLimits::default());
        for _ in 0..3 {
            rl.check_rate_limit("ai", Some("user-1")).await;
        }

        let usage = rl.get_usage_stats("ai").await.unwrap();
        assert!(usage.enabled);
        assert_eq!(usage.current_minute, 3);
        assert_eq!(usage.remaining_minute, 57);
        assert_eq!(usage.current_daily, 3);
        assert_eq!(usage.remaining_daily, 997);

        // Reading usage admits nothing.
        assert_eq!(rl.get_usage_stats("ai").await.unwrap().current_minute, 3);

        rl.reset_limits("ai").await.unwrap();
        let usage = rl.get_usage_stats("ai").await.unwrap();
        assert_eq!(usage.current_minute, 0);
        assert_eq!(usage.current_daily, 0);
    }

    #[tokio::test]
    async fn test_update_limits_takes_effect() {
        let (rl, _) = limiter(ServiceLimits::default());
        assert!(rl.is_rate_limiting_enabled("ai"));

        rl.update_limits(RateLimitConfig::empty().with_service("ai", ServiceLimits::disabled()));
        assert!(!rl.is_rate_limiting_enabled("ai"));
        let d = rl.check_rate_limit("ai", None).await;
        assert_eq!(d.reason, Some(DecisionReason::RateLimitingDisabled));
    }

    #[test]
    fn test_decision_serialization() {
        let d = RateDecision::denied("ai", Window::Minute, 5, 5, 130, None);
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["allowed"], false);
        assert_eq!(json["reason"], "minute_limit_exceeded");
        assert_eq!(json["window"], "minute");
        assert_eq!(json["reset_in"], 50);
        assert!(json.get("remaining_minute").is_none());
    }
}
