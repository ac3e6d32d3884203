//! Process-local registry of named circuit breakers.
//!
//! The registry only knows breakers created in this process. Their state
//! lives in the shared store, so a breaker first requested here may
//! already be open because another process tripped it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::CircuitBreakerConfig;
use crate::resilience::circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitState};
use crate::resilience::clock::Clock;
use crate::store::SharedStore;

/// Healthy/unhealthy counts across the breakers known to this process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub total_circuit_breakers: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    /// Healthy share in [0, 1]; 1.0 when no breaker exists.
    pub overall_health: f64,
    pub breakers: BTreeMap<String, CircuitState>,
}

pub struct CircuitBreakerManager {
    store: Arc<dyn SharedStore>,
    clock: Arc<dyn Clock>,
    presets: HashMap<String, CircuitBreakerConfig>,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerManager {
    pub fn new(store: Arc<dyn SharedStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_presets(store, clock, Vec::new())
    }

    /// Presets are used when `get_breaker` is called without a config.
    pub fn with_presets(
        store: Arc<dyn SharedStore>,
        clock: Arc<dyn Clock>,
        presets: impl IntoIterator<Item = CircuitBreakerConfig>,
    ) -> Self {
        Self {
            store,
            clock,
            presets: presets.into_iter().map(|c| (c.name.clone(), c)).collect(),
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Get the breaker for `name`, creating it on first use.
    ///
    /// `config` only applies when the breaker is created; later calls get
    /// the existing instance regardless of the config passed. Without a
    /// config the preset for `name` is used, else defaults stamped with
    /// `name`. Store I/O for a new breaker happens outside the registry
    /// lock; if two callers race, the first insert wins.
    pub async fn get_breaker(&self, name: &str, config: Option<CircuitBreakerConfig>) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.lock().await.get(name) {
            return existing.clone();
        }

        let mut config = config
            .or_else(|| self.presets.get(name).cloned())
            .unwrap_or_else(|| CircuitBreakerConfig::new(name));
        if config.name != name {
            tracing::warn!(
                requested = %name,
                configured = %config.name,
                "Breaker config name differs from registry name; using registry name"
            );
            config.name = name.to_string();
        }

        let candidate = Arc::new(CircuitBreaker::new(config, self.store.clone(), self.clock.clone()));
        candidate.initialize().await;

        let mut breakers = self.breakers.lock().await;
        let breaker = breakers.entry(name.to_string()).or_insert_with(|| {
            tracing::info!(breaker = %name, "Created new circuit breaker");
            candidate.clone()
        });
        breaker.clone()
    }

    /// Look up a breaker without creating it.
    pub async fn breaker(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.lock().await.get(name).cloned()
    }

    /// Whether `name` is registered here or has a configured preset.
    pub async fn is_known(&self, name: &str) -> bool {
        self.presets.contains_key(name) || self.breakers.lock().await.contains_key(name)
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Clone the registry so store I/O happens without holding the lock.
    async fn registered(&self) -> Vec<(String, Arc<CircuitBreaker>)> {
        let mut all: Vec<_> = self
            .breakers
            .lock()
            .await
            .iter()
            .map(|(name, b)| (name.clone(), b.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub async fn get_all_metrics(&self) -> BTreeMap<String, BreakerSnapshot> {
        let mut out = BTreeMap::new();
        for (name, breaker) in self.registered().await {
            out.insert(name, breaker.get_metrics().await);
        }
        out
    }

    /// Reset one known breaker. Returns false if this process never created it.
    pub async fn reset_breaker(&self, name: &str) -> bool {
        match self.breaker(name).await {
            Some(breaker) => {
                breaker.reset().await;
                true
            }
            None => false,
        }
    }

    pub async fn reset_all(&self) {
        let all = self.registered().await;
        for (_, breaker) in &all {
            breaker.reset().await;
        }
        tracing::info!(count = all.len(), "Reset all circuit breakers");
    }

    pub async fn get_health_summary(&self) -> HealthSummary {
        let mut breakers = BTreeMap::new();
        for (name, breaker) in self.registered().await {
            breakers.insert(name, breaker.state().await);
        }

        let total = breakers.len();
        let healthy = breakers.values().filter(|s| **s == CircuitState::Closed).count();

        HealthSummary {
            total_circuit_breakers: total,
            healthy,
            unhealthy: total - healthy,
            overall_health: if total > 0 { healthy as f64 / total as f64 } else { 1.0 },
            breakers,
        }
    }
}
