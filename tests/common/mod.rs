//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use resilience_guard::config::GuardConfig;
use resilience_guard::lifecycle::Components;
use resilience_guard::resilience::{DependencyFailure, FailureKind, ManualClock};
use resilience_guard::store::{MemoryStore, SharedStore, StoreError};

/// Start of a minute, hour and day bucket so window arithmetic is easy to read.
pub const EPOCH: f64 = 1_700_006_400.0;

pub fn memory_store() -> Arc<dyn SharedStore> {
    Arc::new(MemoryStore::new())
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(EPOCH))
}

pub fn components(config: &GuardConfig) -> (Components, Arc<ManualClock>) {
    let clock = manual_clock();
    (Components::assemble(config, memory_store(), clock.clone()), clock)
}

/// A store whose every operation fails, as if the backend were unreachable.
#[derive(Default)]
pub struct FailingStore {
    pub calls: AtomicUsize,
}

impl FailingStore {
    fn fail(&self) -> StoreError {
        self.calls.fetch_add(1, Ordering::SeqCst);
        StoreError::Backend {
            backend: "failing",
            reason: "connection refused".to_string(),
        }
    }
}

#[async_trait]
impl SharedStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(self.fail())
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<(), StoreError> {
        Err(self.fail())
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(self.fail())
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}

/// Error returned by operations under test.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamError {
    pub kind: FailureKind,
    pub message: &'static str,
}

impl UpstreamError {
    pub fn new(kind: FailureKind) -> Self {
        Self {
            kind,
            message: "upstream failed",
        }
    }
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl DependencyFailure for UpstreamError {
    fn failure_kind(&self) -> FailureKind {
        self.kind
    }
}
