use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::AppState};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = DefaultBodyLimit::max(state.max_body_bytes);

    Router::new()
        // Inference endpoints
        .route("/predict", post(handlers::predict))
        .route("/model", get(handlers::get_model))
        // System endpoints
        .route("/health", get(handlers::health_handler))
        // Add state, body limit and CORS
        .with_state(state)
        .layer(body_limit)
        .layer(cors)
}
