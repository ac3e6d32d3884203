//! Circuit breaker with state held in a shared store.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency presumed down, calls fail fast
//! - Half-Open: probing whether the dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= failure_threshold
//! Open → Half-Open: now - last_failure_time >= recovery_timeout (on next call)
//! Half-Open → Closed: success_count >= success_threshold
//! Half-Open → Open: any expected failure
//! ```
//!
//! # Store Layout
//! ```text
//! circuit_breaker:{name}:state         closed | open | half_open
//! circuit_breaker:{name}:failures      integer
//! circuit_breaker:{name}:successes     integer (half-open only)
//! circuit_breaker:{name}:last_failure  seconds since epoch
//! circuit_breaker:{name}:metrics       JSON aggregate
//! ```
//!
//! # Design Decisions
//! - State lives in the store so every process guarding the same
//!   dependency observes the same circuit
//! - A local mutex serializes bookkeeping within one process; there is no
//!   cross-process lock, so thresholds are approximate under contention
//! - Store failures never fail the call: they are logged and defaults used

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::resilience::clock::Clock;
use crate::resilience::failure::{DependencyFailure, FailureKind};
use crate::store::{self, SharedStore, StoreError};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "closed" => Some(CircuitState::Closed),
            "open" => Some(CircuitState::Open),
            "half_open" => Some(CircuitState::HalfOpen),
            _ => None,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned instead of running the operation while the circuit is open.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("circuit breaker '{name}' is open; retry after {retry_after_secs:.0} seconds")]
pub struct CircuitBreakerError {
    pub name: String,
    /// Seconds until a trial call will be allowed.
    pub retry_after_secs: f64,
}

/// Outcome of a guarded call that did not succeed.
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// The breaker rejected the call; the operation never ran.
    #[error(transparent)]
    Open(#[from] CircuitBreakerError),

    /// The operation ran and failed. The error is passed through unchanged.
    #[error("{0}")]
    Operation(E),
}

impl<E> CallError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CallError::Open(_))
    }

    /// The operation's own error, if it ran.
    pub fn into_operation(self) -> Option<E> {
        match self {
            CallError::Operation(e) => Some(e),
            CallError::Open(_) => None,
        }
    }
}

/// Aggregate counters persisted alongside the breaker state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerMetrics {
    pub total_requests: u64,
    pub total_failures: u64,
    pub total_successes: u64,
    pub total_timeouts: u64,
    pub total_opens: u64,
    pub total_closes: u64,
    pub last_opened_at: Option<f64>,
    pub last_closed_at: Option<f64>,
    /// Running mean of successful call latency, in seconds.
    pub average_response_time: f64,
    pub created_at: f64,
}

/// Derived health flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerHealth {
    pub is_healthy: bool,
    pub can_attempt_reset: bool,
    /// Seconds until a trial call is allowed; zero when one already is.
    pub time_until_retry: f64,
}

/// Read-only view of one breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub current_state: CircuitState,
    pub failure_count: u64,
    pub success_count: u64,
    pub last_failure_time: f64,
    pub config: CircuitBreakerConfig,
    pub metrics: BreakerMetrics,
    pub health: BreakerHealth,
}

struct BreakerKeys {
    state: String,
    failures: String,
    successes: String,
    last_failure: String,
    metrics: String,
}

impl BreakerKeys {
    fn new(name: &str) -> Self {
        let prefix = format!("circuit_breaker:{}", name);
        Self {
            state: format!("{}:state", prefix),
            failures: format!("{}:failures", prefix),
            successes: format!("{}:successes", prefix),
            last_failure: format!("{}:last_failure", prefix),
            metrics: format!("{}:metrics", prefix),
        }
    }
}

/// Guards one logical dependency.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    store: Arc<dyn SharedStore>,
    clock: Arc<dyn Clock>,
    keys: BreakerKeys,
    lock: Mutex<()>,
}

impl CircuitBreaker {
    /// Create a breaker. Does not touch the store; see [`initialize`](Self::initialize).
    pub fn new(config: CircuitBreakerConfig, store: Arc<dyn SharedStore>, clock: Arc<dyn Clock>) -> Self {
        let keys = BreakerKeys::new(&config.name);
        Self {
            config,
            store,
            clock,
            keys,
            lock: Mutex::new(()),
        }
    }

    /// Seed the store with a closed circuit unless another process already did.
    pub async fn initialize(&self) {
        match self.seed_state().await {
            Ok(true) => tracing::info!(breaker = %self.config.name, "Initialized circuit breaker"),
            Ok(false) => {}
            Err(e) => self.log_store_error("initialize", &e),
        }
    }

    async fn seed_state(&self) -> Result<bool, StoreError> {
        let store = self.store.as_ref();
        if store.get(&self.keys.state).await?.is_some() {
            return Ok(false);
        }
        store.set(&self.keys.state, CircuitState::Closed.as_str(), None).await?;
        store.set(&self.keys.failures, "0", None).await?;
        store.set(&self.keys.successes, "0", None).await?;
        store.set(&self.keys.last_failure, "0", None).await?;
        let fresh = BreakerMetrics {
            created_at: self.clock.now(),
            ..BreakerMetrics::default()
        };
        store::set_json(store, &self.keys.metrics, &fresh, None).await?;
        Ok(true)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Suggested deadline for the wrapped call. The breaker does not enforce it.
    pub fn advisory_timeout(&self) -> Duration {
        self.config.timeout()
    }

    /// Current state; `Closed` if the store cannot be read.
    pub async fn state(&self) -> CircuitState {
        match self.store.get(&self.keys.state).await {
            Ok(Some(raw)) => CircuitState::parse(&raw).unwrap_or_else(|| {
                tracing::warn!(breaker = %self.config.name, value = %raw, "Unknown circuit state in store");
                CircuitState::Closed
            }),
            Ok(None) => CircuitState::Closed,
            Err(e) => {
                self.log_store_error("read state", &e);
                CircuitState::Closed
            }
        }
    }

    pub async fn failure_count(&self) -> u64 {
        self.read_counter(&self.keys.failures).await
    }

    pub async fn success_count(&self) -> u64 {
        self.read_counter(&self.keys.successes).await
    }

    /// Seconds since epoch of the last counted failure; 0 when none.
    pub async fn last_failure_time(&self) -> f64 {
        match self.store.get(&self.keys.last_failure).await {
            Ok(Some(raw)) => raw.trim().parse::<f64>().unwrap_or(0.0),
            Ok(None) => 0.0,
            Err(e) => {
                self.log_store_error("read last failure", &e);
                0.0
            }
        }
    }

    /// Run `operation` under the breaker.
    ///
    /// Returns `CallError::Open` without calling `operation` while the
    /// circuit is open and the recovery timeout has not elapsed. Errors from
    /// the operation are returned as `CallError::Operation` after
    /// bookkeeping. No timeout is applied to the operation.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: DependencyFailure,
    {
        if self.state().await == CircuitState::Open {
            self.try_half_open().await?;
        }

        let started = Instant::now();
        match operation().await {
            Ok(value) => {
                let elapsed = started.elapsed();
                metrics::record_breaker_call(&self.config.name, "success", elapsed);
                self.record_success(elapsed).await;
                Ok(value)
            }
            Err(e) => {
                metrics::record_breaker_call(&self.config.name, "failure", started.elapsed());
                self.record_failure(e.failure_kind()).await;
                Err(CallError::Operation(e))
            }
        }
    }

    /// Move an open circuit to half-open if the recovery timeout elapsed.
    async fn try_half_open(&self) -> Result<(), CircuitBreakerError> {
        let _guard = self.lock.lock().await;

        // Another caller in this process may have moved it already.
        let state = self.state().await;
        if state != CircuitState::Open {
            return Ok(());
        }

        let elapsed = self.clock.now() - self.last_failure_time().await;
        let recovery = self.config.recovery_timeout_secs as f64;
        if elapsed >= recovery {
            self.transition(state, CircuitState::HalfOpen).await;
            tracing::info!(breaker = %self.config.name, "Circuit breaker attempting recovery (half-open)");
            return Ok(());
        }

        metrics::record_breaker_rejection(&self.config.name);
        tracing::debug!(breaker = %self.config.name, "Circuit open, rejecting call");
        Err(CircuitBreakerError {
            name: self.config.name.clone(),
            retry_after_secs: (recovery - elapsed).max(0.0),
        })
    }

    async fn record_success(&self, elapsed: Duration) {
        let _guard = self.lock.lock().await;
        let state = self.state().await;

        match state {
            CircuitState::HalfOpen => match self.store.incr(&self.keys.successes, None).await {
                Ok(successes) if successes >= u64::from(self.config.success_threshold) => {
                    self.transition(state, CircuitState::Closed).await;
                    self.write_counter(&self.keys.failures, 0).await;
                    self.write_counter(&self.keys.successes, 0).await;
                    tracing::info!(
                        breaker = %self.config.name,
                        successes,
                        "Circuit breaker closed after successful trial calls"
                    );
                }
                Ok(successes) => {
                    tracing::debug!(breaker = %self.config.name, successes, "Half-open trial call succeeded");
                }
                Err(e) => self.log_store_error("record success", &e),
            },
            CircuitState::Open => {
                tracing::warn!(breaker = %self.config.name, "Success recorded while circuit is open");
            }
            CircuitState::Closed => {}
        }

        let secs = elapsed.as_secs_f64();
        self.update_metrics(|m| {
            m.total_requests += 1;
            m.total_successes += 1;
            if secs > 0.0 {
                let n = m.total_successes as f64;
                m.average_response_time = (m.average_response_time * (n - 1.0) + secs) / n;
            }
        })
        .await;
    }

    async fn record_failure(&self, kind: FailureKind) {
        let _guard = self.lock.lock().await;

        if !self.config.is_expected(kind) {
            tracing::debug!(breaker = %self.config.name, kind = %kind, "Ignoring unexpected failure kind");
            self.update_metrics(|m| m.total_requests += 1).await;
            return;
        }

        let state = self.state().await;
        let failures = match self.store.incr(&self.keys.failures, None).await {
            Ok(n) => n,
            Err(e) => {
                self.log_store_error("record failure", &e);
                return;
            }
        };
        let now = self.clock.now();
        if let Err(e) = self.store.set(&self.keys.last_failure, &now.to_string(), None).await {
            self.log_store_error("record failure time", &e);
        }

        match state {
            CircuitState::Closed if failures >= u64::from(self.config.failure_threshold) => {
                self.transition(state, CircuitState::Open).await;
                self.write_counter(&self.keys.successes, 0).await;
                tracing::warn!(breaker = %self.config.name, failures, "Circuit breaker opened");
            }
            CircuitState::HalfOpen => {
                self.transition(state, CircuitState::Open).await;
                self.write_counter(&self.keys.successes, 0).await;
                tracing::warn!(breaker = %self.config.name, "Circuit breaker reopened after failed trial call");
            }
            _ => {
                tracing::debug!(breaker = %self.config.name, failures, kind = %kind, "Failure recorded");
            }
        }

        self.update_metrics(|m| {
            m.total_requests += 1;
            m.total_failures += 1;
            if kind == FailureKind::Timeout {
                m.total_timeouts += 1;
            }
        })
        .await;
    }

    /// Write a new state and update transition metrics when it changed.
    async fn transition(&self, from: CircuitState, to: CircuitState) {
        if let Err(e) = self.store.set(&self.keys.state, to.as_str(), None).await {
            self.log_store_error("write state", &e);
            return;
        }
        if from == to {
            return;
        }

        let now = self.clock.now();
        self.update_metrics(|m| match to {
            CircuitState::Open => {
                m.total_opens += 1;
                m.last_opened_at = Some(now);
            }
            CircuitState::Closed => {
                m.total_closes += 1;
                m.last_closed_at = Some(now);
            }
            CircuitState::HalfOpen => {}
        })
        .await;

        metrics::record_breaker_transition(&self.config.name, from.as_str(), to.as_str());
        metrics::record_breaker_health(&self.config.name, to == CircuitState::Closed);
        tracing::info!(
            breaker = %self.config.name,
            from = %from,
            to = %to,
            "Circuit breaker state changed"
        );
    }

    /// Snapshot of state, counters, config and derived health.
    pub async fn get_metrics(&self) -> BreakerSnapshot {
        let current_state = self.state().await;
        let failure_count = self.failure_count().await;
        let success_count = self.success_count().await;
        let last_failure_time = self.last_failure_time().await;
        let metrics = self.read_metrics().await;

        let recovery = self.config.recovery_timeout_secs as f64;
        let since_failure = self.clock.now() - last_failure_time;

        BreakerSnapshot {
            name: self.config.name.clone(),
            current_state,
            failure_count,
            success_count,
            last_failure_time,
            config: self.config.clone(),
            metrics,
            health: BreakerHealth {
                is_healthy: current_state == CircuitState::Closed,
                can_attempt_reset: current_state == CircuitState::Open && since_failure >= recovery,
                time_until_retry: (recovery - since_failure).max(0.0),
            },
        }
    }

    /// Force the circuit closed and clear its counters. Idempotent.
    pub async fn reset(&self) {
        let _guard = self.lock.lock().await;
        let state = self.state().await;

        self.transition(state, CircuitState::Closed).await;
        self.write_counter(&self.keys.failures, 0).await;
        self.write_counter(&self.keys.successes, 0).await;
        if let Err(e) = self.store.set(&self.keys.last_failure, "0", None).await {
            self.log_store_error("reset last failure", &e);
        }
        tracing::info!(breaker = %self.config.name, previous = %state, "Circuit breaker manually reset");
    }

    async fn read_counter(&self, key: &str) -> u64 {
        match store::get_counter(self.store.as_ref(), key).await {
            Ok(n) => n,
            Err(e) => {
                self.log_store_error("read counter", &e);
                0
            }
        }
    }

    async fn write_counter(&self, key: &str, value: u64) {
        if let Err(e) = self.store.set(key, &value.to_string(), None).await {
            self.log_store_error("write counter", &e);
        }
    }

    async fn read_metrics(&self) -> BreakerMetrics {
        match store::get_json::<BreakerMetrics>(self.store.as_ref(), &self.keys.metrics).await {
            Ok(m) => m.unwrap_or_default(),
            Err(e) => {
                self.log_store_error("read metrics", &e);
                BreakerMetrics::default()
            }
        }
    }

    async fn update_metrics(&self, update: impl FnOnce(&mut BreakerMetrics)) {
        let mut m = self.read_metrics().await;
        if m.created_at == 0.0 {
            m.created_at = self.clock.now();
        }
        update(&mut m);
        if let Err(e) = store::set_json(self.store.as_ref(), &self.keys.metrics, &m, None).await {
            self.log_store_error("write metrics", &e);
        }
    }

    fn log_store_error(&self, action: &'static str, error: &StoreError) {
        metrics::record_store_error("circuit_breaker");
        tracing::error!(
            breaker = %self.config.name,
            backend = self.store.backend_name(),
            action,
            error = %error,
            "Circuit breaker store operation failed"
        );
    }
}
