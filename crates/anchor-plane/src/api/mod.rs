//! API module for the anchor plane server

pub mod error;
pub mod handlers;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use handlers::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Readiness check response
#[derive(Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub store: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,
    pub tracked_tokens: usize,
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
/// Not ready while the store cannot report the chain tail.
pub async fn ready(State(state): State<Arc<AppState>>) -> Json<ReadyResponse> {
    let height = state.ledger.height().await.ok();

    Json(ReadyResponse {
        ready: height.is_some(),
        store: state.ledger.backend().to_string(),
        height,
        tracked_tokens: state.issuer.tracked_tokens(),
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
        // Token endpoints
        .route("/v1/tokens", post(handlers::issue_token))
        .route("/v1/tokens/revoke", post(handlers::revoke_token))
        .route("/v1/tokens/status", post(handlers::token_status))
        // Proof endpoints
        .route("/v1/proofs/anchor", post(handlers::anchor_proof))
        .route("/v1/proofs/verify", post(handlers::verify_proof))
        .route("/v1/proofs/history", post(handlers::verify_history))
        // Ledger endpoints
        .route("/v1/ledger/height", get(handlers::ledger_height))
        .route("/v1/ledger/entries", get(handlers::list_entries))
        .route("/v1/ledger/integrity", get(handlers::chain_integrity))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
