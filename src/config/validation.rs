//! Configuration validation.
//!
//! Serde handles syntax; this module checks values. Every problem is
//! reported, not just the first.

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{GuardConfig, StoreBackend};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match config.store.backend {
        StoreBackend::File if config.store.path.trim().is_empty() => {
            errors.push(ValidationError::new("store.path", "required for the file backend"));
        }
        StoreBackend::Redis if config.store.url.trim().is_empty() => {
            errors.push(ValidationError::new("store.url", "required for the redis backend"));
        }
        _ => {}
    }
    if config.store.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("store.sweep_interval_secs", "must be greater than 0"));
    }

    let mut seen = HashSet::new();
    for (i, breaker) in config.breakers.iter().enumerate() {
        let field = |name: &str| format!("breakers[{}].{}", i, name);
        if breaker.name.trim().is_empty() {
            errors.push(ValidationError::new(field("name"), "must not be empty"));
        } else if !seen.insert(breaker.name.as_str()) {
            errors.push(ValidationError::new(field("name"), format!("duplicate breaker '{}'", breaker.name)));
        }
        if breaker.failure_threshold == 0 {
            errors.push(ValidationError::new(field("failure_threshold"), "must be greater than 0"));
        }
        if breaker.success_threshold == 0 {
            errors.push(ValidationError::new(field("success_threshold"), "must be greater than 0"));
        }
        if breaker.expected_failure_kinds.is_empty() {
            errors.push(ValidationError::new(
                field("expected_failure_kinds"),
                "must list at least one kind or the breaker can never open",
            ));
        }
    }

    for (service, limits) in &config.rate_limits.services {
        if !limits.enabled {
            continue;
        }
        let field = |name: &str| format!("rate_limits.{}.{}", service, name);
        if limits.requests_per_minute == 0 {
            errors.push(ValidationError::new(field("requests_per_minute"), "must be greater than 0"));
        }
        if limits.requests_per_day == 0 {
            errors.push(ValidationError::new(field("requests_per_day"), "must be greater than 0"));
        }
        if limits.burst_limit == 0 {
            errors.push(ValidationError::new(field("burst_limit"), "must be greater than 0"));
        }
    }

    if config.health.enabled && config.health.interval_secs == 0 {
        errors.push(ValidationError::new("health.interval_secs", "must be greater than 0"));
    }

    if config.admin.enabled {
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new("admin.bind_address", "not a socket address"));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "not a socket address"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
