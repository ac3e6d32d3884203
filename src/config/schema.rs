//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the guard.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::failure::FailureKind;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Shared state store selection.
    pub store: StoreConfig,

    /// Circuit breaker presets, looked up by name on first use.
    pub breakers: Vec<CircuitBreakerConfig>,

    /// Rate limits per service name.
    pub rate_limits: RateLimitConfig,

    /// Periodic health report settings.
    pub health: HealthCheckConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl GuardConfig {
    /// Find the breaker preset registered under `name`.
    pub fn breaker(&self, name: &str) -> Option<&CircuitBreakerConfig> {
        self.breakers.iter().find(|b| b.name == name)
    }
}

/// Which store backend to use.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    File,
    Redis,
}

/// Shared state store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// State file for the `file` backend.
    pub path: String,

    /// Connection string for the `redis` backend.
    pub url: String,

    /// Seconds between sweeps of expired keys. Redis expires keys itself.
    pub sweep_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: "guard-state.json".to_string(),
            url: "redis://127.0.0.1:6379".to_string(),
            sweep_interval_secs: 60,
        }
    }
}

/// Configuration for one guarded dependency.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Breaker name; also the store key namespace.
    pub name: String,

    /// Failures counted while closed before the circuit opens.
    pub failure_threshold: u32,

    /// Seconds after the last failure before a trial call is allowed.
    pub recovery_timeout_secs: u64,

    /// Successful trial calls needed to close from half-open.
    pub success_threshold: u32,

    /// Suggested deadline for the wrapped call. Not enforced by the breaker.
    pub timeout_secs: u64,

    /// Failure kinds that count against the breaker.
    pub expected_failure_kinds: Vec<FailureKind>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            failure_threshold: 5,
            recovery_timeout_secs: 60,
            success_threshold: 3,
            timeout_secs: 30,
            expected_failure_kinds: FailureKind::ALL.to_vec(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Defaults stamped with a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_recovery_timeout_secs(mut self, secs: u64) -> Self {
        self.recovery_timeout_secs = secs;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_expected_failure_kinds(mut self, kinds: impl IntoIterator<Item = FailureKind>) -> Self {
        self.expected_failure_kinds = kinds.into_iter().collect();
        self
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Whether a failure of this kind counts against the breaker.
    pub fn is_expected(&self, kind: FailureKind) -> bool {
        self.expected_failure_kinds.contains(&kind)
    }
}

/// Limits for one rate-limited service.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceLimits {
    pub enabled: bool,
    pub requests_per_minute: u64,
    pub requests_per_day: u64,

    /// Cap per 10 second window.
    pub burst_limit: u64,
}

impl Default for ServiceLimits {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 60,
            requests_per_day: 1000,
            burst_limit: 5,
        }
    }
}

impl ServiceLimits {
    /// A service that is known but never limited.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Rate limit configuration keyed by service name.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct RateLimitConfig {
    pub services: BTreeMap<String, ServiceLimits>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut services = BTreeMap::new();
        // Remote AI API is metered; local OCR is not.
        services.insert("ai_api".to_string(), ServiceLimits::default());
        services.insert("ocr".to_string(), ServiceLimits::disabled());
        Self { services }
    }
}

impl RateLimitConfig {
    pub fn empty() -> Self {
        Self {
            services: BTreeMap::new(),
        }
    }

    pub fn with_service(mut self, name: impl Into<String>, limits: ServiceLimits) -> Self {
        self.services.insert(name.into(), limits);
        self
    }
}

/// Health report configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Run the periodic health monitor.
    pub enabled: bool,

    /// Report interval in seconds.
    pub interval_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: GuardConfig = toml::from_str("").unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(config.rate_limits.services["ai_api"].enabled);
        assert!(!config.rate_limits.services["ocr"].enabled);
        assert!(config.breakers.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let raw = r#"
            [store]
            backend = "file"
            path = "/var/lib/guard/state.json"

            [[breakers]]
            name = "ai_api"
            failure_threshold = 3
            recovery_timeout_secs = 120
            expected_failure_kinds = ["timeout", "connection", "unavailable"]

            [rate_limits.ai_api]
            requests_per_minute = 15
            requests_per_day = 1500
            burst_limit = 3

            [admin]
            api_key = "secret"
        "#;

        let config: GuardConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.store.backend, StoreBackend::File);

        let breaker = config.breaker("ai_api").unwrap();
        assert_eq!(breaker.failure_threshold, 3);
        assert_eq!(breaker.recovery_timeout_secs, 120);
        assert_eq!(breaker.success_threshold, 3);
        assert!(breaker.is_expected(FailureKind::Timeout));
        assert!(!breaker.is_expected(FailureKind::Validation));

        let limits = &config.rate_limits.services["ai_api"];
        assert_eq!(limits.requests_per_minute, 15);
        assert!(limits.enabled);
        assert!(!config.rate_limits.services.contains_key("ocr"));
        assert_eq!(config.admin.api_key, "secret");
    }
}
