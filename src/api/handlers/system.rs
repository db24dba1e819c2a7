use axum::{extract::State, Json};

use crate::api::{state::AppState, types::*};

/// GET /health -- lightweight liveness check
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        layers: state.inference.network().layers.len(),
    })
}

/// GET /model -- ordered layer descriptors for visualization clients
pub async fn get_model(State(state): State<AppState>) -> Json<ModelSummary> {
    Json(ModelSummary::from(state.inference.network()))
}
