//! Startup orchestration.
//!
//! The composition root: builds the store, breaker registry and rate
//! limiter from a validated config. Nothing here is a global; the caller
//! owns the returned components and shares them through `Arc`.

use std::sync::Arc;

use thiserror::Error;

use crate::config::{GuardConfig, StoreBackend, StoreConfig};
use crate::resilience::clock::{Clock, SystemClock};
use crate::resilience::manager::CircuitBreakerManager;
use crate::security::rate_limit::RateLimiter;
use crate::store::{FileStore, MemoryStore, SharedStore, StoreError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to open state store: {0}")]
    Store(#[from] StoreError),

    #[error("store backend '{0}' requires building with the `{0}` feature")]
    BackendNotCompiled(&'static str),
}

/// Everything a process needs to guard its outbound calls.
#[derive(Clone)]
pub struct Components {
    pub store: Arc<dyn SharedStore>,
    pub clock: Arc<dyn Clock>,
    pub breakers: Arc<CircuitBreakerManager>,
    pub limiter: Arc<RateLimiter>,
}

impl Components {
    /// Wire components over an existing store and clock.
    pub fn assemble(config: &GuardConfig, store: Arc<dyn SharedStore>, clock: Arc<dyn Clock>) -> Self {
        let breakers = Arc::new(CircuitBreakerManager::with_presets(
            store.clone(),
            clock.clone(),
            config.breakers.clone(),
        ));
        let limiter = Arc::new(RateLimiter::new(config.rate_limits.clone(), store.clone(), clock.clone()));
        Self {
            store,
            clock,
            breakers,
            limiter,
        }
    }

    /// Open the configured store and wire components on the system clock.
    pub async fn build(config: &GuardConfig) -> Result<Self, StartupError> {
        let store = open_store(&config.store).await?;
        tracing::info!(backend = store.backend_name(), "State store ready");

        let components = Self::assemble(config, store, Arc::new(SystemClock));
        for preset in &config.breakers {
            components.breakers.get_breaker(&preset.name, None).await;
        }
        Ok(components)
    }
}

pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn SharedStore>, StartupError> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::File => Ok(Arc::new(FileStore::open(&config.path)?)),
        #[cfg(feature = "redis")]
        StoreBackend::Redis => Ok(Arc::new(crate::store::RedisStore::new(&config.url).await?)),
        #[cfg(not(feature = "redis"))]
        StoreBackend::Redis => Err(StartupError::BackendNotCompiled("redis")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CircuitBreakerConfig;

    #[tokio::test]
    async fn test_build_registers_presets() {
        let mut config = GuardConfig::default();
        config.breakers.push(CircuitBreakerConfig::new("ai_api").with_failure_threshold(2));

        let components = Components::build(&config).await.unwrap();
        assert_eq!(components.breakers.names().await, vec!["ai_api".to_string()]);
        assert_eq!(components.store.backend_name(), "memory");
        assert!(components.limiter.is_rate_limiting_enabled("ai_api"));
    }

    #[tokio::test]
    async fn test_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GuardConfig::default();
        config.store.backend = StoreBackend::File;
        config.store.path = dir.path().join("state.json").display().to_string();

        let components = Components::build(&config).await.unwrap();
        assert_eq!(components.store.backend_name(), "file");
    }
}
