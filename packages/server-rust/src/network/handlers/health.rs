//! Health, liveness, and readiness endpoint handlers.
//!
//! `/healthz` keeps the classic role probe body; `/health/*` are for
//! orchestrators and operational monitoring.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use linkgate_core::HealthResponse;
use serde_json::json;

use super::{AppState, BackendState};
use crate::network::HealthState;

/// Detailed process health as JSON. Always 200; read `state` for readiness.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "role": state.role.as_str(),
        "state": state.shutdown.health_state().as_str(),
        "in_flight": state.shutdown.in_flight_count(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Liveness probe. Only says the process answers.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: 200 when ready, 503 while starting, draining, or stopped.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Backend `/healthz`: healthy when the store answers.
pub async fn backend_healthz_handler(
    State(state): State<BackendState>,
) -> (StatusCode, Json<HealthResponse>) {
    match state.shortener.check_health().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse::healthy())),
        Err(e) => {
            tracing::warn!(error = %e, "storage health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse::unhealthy(e.to_string())),
            )
        }
    }
}

/// Gateway `/healthz`: healthy while ready.
pub async fn gateway_healthz_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    match state.shutdown.health_state() {
        HealthState::Ready => (StatusCode::OK, Json(HealthResponse::healthy())),
        other => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse::unhealthy(format!("gateway is {}", other.as_str()))),
        ),
    }
}
