//! HTTP server setup with Axum

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use super::websocket::{ws_handler, AppState};

/// Create the Axum router with the websocket endpoint mounted at `path`
pub fn create_router(state: Arc<AppState>, path: &str) -> Router {
    // CORS configuration - allow all origins for development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(path, get(ws_handler))
        .route("/health", get(health_check))
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "connections": state.active_connections(),
    }))
}
