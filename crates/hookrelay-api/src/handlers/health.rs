//! Health check handlers for service monitoring.
//!
//! Liveness answers without touching dependencies; health and readiness
//! probe storage connectivity.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, instrument};

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub checks: HealthChecks,
    pub version: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub storage: ComponentHealth,
}

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub response_time_ms: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Down,
}

/// `GET /health`
#[instrument(name = "health_check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Response {
    let timestamp = state.clock.now_utc();
    let started = state.clock.now();

    let storage = match state.store.health_check().await {
        Ok(()) => {
            debug!("storage health check passed");
            ComponentHealth { status: ComponentStatus::Up, message: None, response_time_ms: 0 }
        },
        Err(e) => {
            error!(error = %e, "storage health check failed");
            ComponentHealth {
                status: ComponentStatus::Down,
                message: Some("storage connection failed".to_string()),
                response_time_ms: 0,
            }
        },
    };
    let elapsed = started.elapsed();

    let (status, status_code) = match storage.status {
        ComponentStatus::Up => (HealthStatus::Healthy, StatusCode::OK),
        ComponentStatus::Down => (HealthStatus::Unhealthy, StatusCode::SERVICE_UNAVAILABLE),
    };

    let response = HealthResponse {
        status,
        timestamp,
        checks: HealthChecks {
            storage: ComponentHealth {
                response_time_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                ..storage
            },
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response)).into_response()
}

/// `GET /ready`
///
/// Identical to the health check; exists as a separate route so probe
/// configuration can diverge later.
#[instrument(name = "readiness_check", skip(state))]
pub async fn readiness_check(State(state): State<AppState>) -> Response {
    health_check(State(state)).await
}

/// `GET /live`
#[instrument(name = "liveness_check", skip(state))]
pub async fn liveness_check(State(state): State<AppState>) -> Response {
    let response = serde_json::json!({
        "status": "alive",
        "timestamp": state.clock.now_utc(),
        "service": "hookrelay",
    });
    (StatusCode::OK, Json(response)).into_response()
}
