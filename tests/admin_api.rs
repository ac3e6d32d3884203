//! Admin API routes driven through the router without a socket.

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use resilience_guard::admin::{setup_admin_router, AdminState};
use resilience_guard::config::{CircuitBreakerConfig, GuardConfig, HealthCheckConfig};
use resilience_guard::health::HealthMonitor;
use resilience_guard::lifecycle::Components;
use resilience_guard::resilience::FailureKind;

mod common;

const KEY: &str = "test-admin-key";

fn config() -> GuardConfig {
    GuardConfig {
        breakers: vec![CircuitBreakerConfig::new("ai_api").with_failure_threshold(1)],
        ..GuardConfig::default()
    }
}

fn app(components: &Components) -> Router {
    let monitor = HealthMonitor::new(
        components.breakers.clone(),
        components.limiter.clone(),
        components.clock.clone(),
        HealthCheckConfig::default(),
    );
    setup_admin_router(AdminState::new(components.clone(), monitor.latest(), KEY))
}

async fn send(app: &Router, method: Method, uri: &str, key: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = key {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
    }
    let response = app
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_requests_without_valid_key_are_rejected() {
    let (components, _) = common::components(&config());
    let app = app(&components);

    let (status, _) = send(&app, Method::GET, "/admin/status", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::GET, "/admin/status", Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, Method::GET, "/admin/status", Some(KEY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "operational");
    assert_eq!(body["store_backend"], "memory");
}

#[tokio::test]
async fn test_breaker_inspection_and_reset() {
    let (components, _) = common::components(&config());
    let app = app(&components);

    let breaker = components.breakers.get_breaker("ai_api", None).await;
    let _ = breaker.call(|| async { Err::<(), _>(FailureKind::Timeout) }).await;

    let (status, body) = send(&app, Method::GET, "/admin/breakers/ai_api", Some(KEY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_state"], "open");
    assert_eq!(body["failure_count"], 1);
    assert_eq!(body["config"]["failure_threshold"], 1);

    let (status, body) = send(&app, Method::GET, "/admin/breakers", Some(KEY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ai_api"]["health"]["is_healthy"], false);

    let (status, body) = send(&app, Method::POST, "/admin/breakers/ai_api/reset", Some(KEY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["before"]["state"], "open");
    assert_eq!(body["before"]["failure_count"], 1);
    assert_eq!(body["after"]["state"], "closed");
    assert_eq!(body["after"]["failure_count"], 0);
}

#[tokio::test]
async fn test_preset_breaker_is_materialized_on_lookup() {
    let (components, _) = common::components(&config());
    let app = app(&components);
    assert!(components.breakers.names().await.is_empty());

    let (status, body) = send(&app, Method::GET, "/admin/breakers/ai_api", Some(KEY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_state"], "closed");
    assert_eq!(components.breakers.names().await, vec!["ai_api".to_string()]);

    let (status, body) = send(&app, Method::GET, "/admin/breakers/unknown", Some(KEY)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("unknown"));
}

#[tokio::test]
async fn test_reset_all_returns_health_summary() {
    let (components, _) = common::components(&config());
    let app = app(&components);

    let breaker = components.breakers.get_breaker("ai_api", None).await;
    let _ = breaker.call(|| async { Err::<(), _>(FailureKind::Connection) }).await;
    components.breakers.get_breaker("ocr", None).await;

    let (status, body) = send(&app, Method::POST, "/admin/breakers/reset", Some(KEY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_circuit_breakers"], 2);
    assert_eq!(body["healthy"], 2);
    assert_eq!(body["overall_health"], 1.0);
}

#[tokio::test]
async fn test_usage_and_limit_reset() {
    let (components, _) = common::components(&config());
    let app = app(&components);

    for _ in 0..3 {
        components.limiter.check_rate_limit("ai_api", None).await;
    }

    let (status, body) = send(&app, Method::GET, "/admin/limits/ai_api", Some(KEY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_minute"], 3);
    assert_eq!(body["limit_minute"], 60);
    assert_eq!(body["remaining_minute"], 57);

    let (status, body) = send(&app, Method::POST, "/admin/limits/ai_api/reset", Some(KEY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_minute"], 0);

    let (status, _) = send(&app, Method::GET, "/admin/limits/translate", Some(KEY)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_usage_reports_store_outage() {
    let clock = common::manual_clock();
    let components = Components::assemble(
        &config(),
        std::sync::Arc::new(common::FailingStore::default()),
        clock,
    );
    let app = app(&components);

    let (status, body) = send(&app, Method::GET, "/admin/limits/ai_api", Some(KEY)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("connection refused"));
}

#[tokio::test]
async fn test_health_builds_report_on_demand() {
    let (components, _) = common::components(&config());
    let app = app(&components);

    let (status, body) = send(&app, Method::GET, "/admin/health", Some(KEY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["overall_status"], "healthy");
    assert_eq!(body["checked_at"], common::EPOCH as u64);
    assert_eq!(body["rate_limits"]["ai_api"]["status"], "healthy");
    assert_eq!(body["rate_limits"]["ocr"]["status"], "healthy");
}

#[tokio::test]
async fn test_health_is_unhealthy_when_store_unreadable() {
    let components = Components::assemble(
        &config(),
        std::sync::Arc::new(common::FailingStore::default()),
        common::manual_clock(),
    );
    let app = app(&components);

    let (status, body) = send(&app, Method::GET, "/admin/health", Some(KEY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["overall_status"], "unhealthy");
    assert_eq!(body["rate_limits"]["ai_api"]["status"], "unhealthy");
    assert!(body["rate_limits"]["ai_api"]["error"]
        .as_str()
        .unwrap()
        .contains("connection refused"));
}
