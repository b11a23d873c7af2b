pub mod eod_routes;
pub mod tracking_routes;

use axum::{extract::State, response::Json, routing::get, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::middleware::cors::cors_middleware_with_origins;
use crate::state::AppState;

/// Armar el router completo de la API
pub fn create_router(state: AppState) -> Router {
    let cors = cors_middleware_with_origins(state.config.cors_origins.clone());

    Router::new()
        .route("/health", get(health))
        .nest("/api/tracking", tracking_routes::create_tracking_router())
        .nest("/api/eod", eod_routes::create_eod_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cache = match &state.report_cache {
        Some(cache) if cache.is_connected().await => "connected",
        Some(_) => "unreachable",
        None => "disabled",
    };

    Json(json!({
        "status": "ok",
        "environment": state.config.environment,
        "observers": state.broadcaster.observer_count().await,
        "cache": cache,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
