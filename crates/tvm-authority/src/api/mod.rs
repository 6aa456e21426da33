//! HTTP API for the ticket authority

pub mod error;
pub mod handlers;
pub mod state;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Readiness check response
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub service_count: usize,
    pub algorithm: String,
    pub ticket_ttl_secs: u64,
}

/// Health check endpoint
///
/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// Readiness check endpoint
///
/// GET /ready
///
/// Not ready while the service store is unreachable.
pub async fn ready(State(state): State<Arc<AppState>>) -> Json<ReadyResponse> {
    let listed = state.registry.list().await;

    Json(ReadyResponse {
        ready: listed.is_ok(),
        service_count: listed.map(|v| v.len()).unwrap_or(0),
        algorithm: state.registry.key_manager().algorithm().to_string(),
        ticket_ttl_secs: state.config.ticket_ttl.as_secs(),
    })
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Service registry
        .route(
            "/v1/services",
            post(handlers::register_service).get(handlers::list_services),
        )
        .route(
            "/v1/services/{id}",
            get(handlers::get_service).patch(handlers::update_service),
        )
        .route("/v1/services/{id}/public-key", get(handlers::get_public_key))
        .route("/v1/services/{id}/rotate", post(handlers::rotate_key))
        .route("/v1/services/{id}/rotations", get(handlers::list_rotations))
        // Access graph
        .route("/v1/access/grant", post(handlers::grant_access))
        .route("/v1/access/revoke", post(handlers::revoke_access))
        .route("/v1/access/check", post(handlers::check_access))
        // Tickets
        .route("/v1/tickets/issue", post(handlers::issue_ticket))
        .route("/v1/tickets/validate", post(handlers::validate_ticket))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
