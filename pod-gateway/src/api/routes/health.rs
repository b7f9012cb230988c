//! Health check routes.

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};

use crate::api::models::{ComponentHealth, HealthResponse};
use crate::api::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
}

/// Full component report.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let system_health = state.health_checker.check_all().await;

    let mut components: Vec<ComponentHealth> = system_health
        .components
        .into_iter()
        .map(|(name, health)| ComponentHealth {
            name,
            status: health.status.to_string(),
            message: health.message,
        })
        .collect();
    components.sort_by(|a, b| a.name.cmp(&b.name));

    Json(HealthResponse {
        status: system_health.status.to_string(),
        version: system_health.version,
        uptime_secs: state.start_time.elapsed().as_secs(),
        components,
    })
}

/// 200 when healthy or degraded, 503 otherwise.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.health_checker.check_ready().await {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn liveness_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "alive",
            "uptime_secs": uptime
        })),
    )
}
