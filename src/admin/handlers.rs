use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::admin::AdminState;
use crate::health::report::{build_report, HealthReport};
use crate::resilience::circuit_breaker::{BreakerSnapshot, CircuitState};
use crate::resilience::manager::HealthSummary;
use crate::security::rate_limit::UsageStats;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unknown circuit breaker '{0}'")]
    UnknownBreaker(String),

    #[error("unknown rate-limited service '{0}'")]
    UnknownService(String),

    #[error("state store unavailable: {0}")]
    StoreUnavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::UnknownBreaker(_) | ApiError::UnknownService(_) => StatusCode::NOT_FOUND,
            ApiError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub store_backend: String,
    pub breakers: usize,
}

/// Breaker state as shown before and after a reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerBrief {
    pub state: CircuitState,
    pub failure_count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetOutcome {
    pub name: String,
    pub before: BreakerBrief,
    pub after: BreakerBrief,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        store_backend: state.components.store.backend_name().to_string(),
        breakers: state.components.breakers.names().await.len(),
    })
}

pub async fn list_breakers(State(state): State<AdminState>) -> Json<BTreeMap<String, BreakerSnapshot>> {
    Json(state.components.breakers.get_all_metrics().await)
}

/// Breakers are materialized on lookup so state written by other processes
/// is visible; names must be registered or have a configured preset.
pub async fn get_breaker(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<BreakerSnapshot>, ApiError> {
    let manager = &state.components.breakers;
    if !manager.is_known(&name).await {
        return Err(ApiError::UnknownBreaker(name));
    }
    let breaker = manager.get_breaker(&name, None).await;
    Ok(Json(breaker.get_metrics().await))
}

pub async fn reset_breaker(
    State(state): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<ResetOutcome>, ApiError> {
    let manager = &state.components.breakers;
    if !manager.is_known(&name).await {
        return Err(ApiError::UnknownBreaker(name));
    }
    let breaker = manager.get_breaker(&name, None).await;

    let before = BreakerBrief {
        state: breaker.state().await,
        failure_count: breaker.failure_count().await,
    };
    breaker.reset().await;
    let after = BreakerBrief {
        state: breaker.state().await,
        failure_count: breaker.failure_count().await,
    };

    tracing::info!(breaker = %name, before = %before.state, "Breaker reset via admin API");
    Ok(Json(ResetOutcome { name, before, after }))
}

pub async fn reset_all_breakers(State(state): State<AdminState>) -> Json<HealthSummary> {
    state.components.breakers.reset_all().await;
    Json(state.components.breakers.get_health_summary().await)
}

pub async fn get_usage(
    State(state): State<AdminState>,
    Path(service): Path<String>,
) -> Result<Json<UsageStats>, ApiError> {
    let limiter = &state.components.limiter;
    if limiter.service_limits(&service).is_none() {
        return Err(ApiError::UnknownService(service));
    }
    limiter
        .get_usage_stats(&service)
        .await
        .map(Json)
        .map_err(|e| ApiError::StoreUnavailable(e.to_string()))
}

pub async fn reset_limits(
    State(state): State<AdminState>,
    Path(service): Path<String>,
) -> Result<Json<UsageStats>, ApiError> {
    let limiter = &state.components.limiter;
    if limiter.service_limits(&service).is_none() {
        return Err(ApiError::UnknownService(service));
    }
    let store_err = |e: crate::store::StoreError| ApiError::StoreUnavailable(e.to_string());
    limiter.reset_limits(&service).await.map_err(store_err)?;
    limiter.get_usage_stats(&service).await.map(Json).map_err(store_err)
}

/// Latest periodic report, or a fresh one if the monitor has not run yet.
pub async fn get_health(State(state): State<AdminState>) -> Json<HealthReport> {
    if let Some(report) = state.latest.load_full() {
        return Json(report.as_ref().clone());
    }
    let c = &state.components;
    Json(build_report(&c.breakers, &c.limiter, c.clock.as_ref()).await)
}
