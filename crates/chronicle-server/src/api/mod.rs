//! HTTP API
//!
//! A single `/graphql` RPC endpoint plus `/health`. The middleware stack
//! (compression, request tracing, CORS, bearer-token identity) wraps every
//! route.

pub mod operations;
pub mod response;

use axum::{extract::State, middleware::from_fn_with_state, routing::get, routing::post, Json, Router};
use serde_json::json;
use tower_http::compression::CompressionLayer;

use crate::config::Config;
use crate::features::FeatureState;
use crate::middleware;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub features: FeatureState,
    /// Which store backend the process runs on ("postgres" or "memory")
    pub backend: &'static str,
}

/// Build the application router with all routes and middleware.
pub fn app(state: AppState, config: &Config) -> Router {
    let tokens = state.features.tokens.clone();

    Router::new()
        .route("/health", get(health))
        .route("/graphql", post(operations::graphql))
        .layer(from_fn_with_state(tokens, middleware::auth::attach_identity))
        .with_state(state)
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors))
}

/// Liveness probe reporting the active store backend.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "backend": state.backend,
    }))
}
