//! Health check handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub analytics_sink: String,
    pub timestamp: String,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "beacon".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        analytics_sink: state.telemetry.sink_name().to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub async fn health_check_simple() -> &'static str {
    "OK"
}

pub async fn live_check() -> StatusCode {
    StatusCode::OK
}
