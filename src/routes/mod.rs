//! API route handlers.

pub mod auth;
pub mod member;

use crate::auth::middleware::AppState;
use crate::error::AppError;
use crate::middleware::{rate_limit, security_headers};
use alloy_primitives::Address;
use axum::{middleware, routing::get, routing::post, Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

/// Parse a `0x`-prefixed 20-byte hex address.
pub fn parse_address(raw: &str) -> Result<Address, AppError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::InvalidRequest("address is required".to_string()));
    }
    if !raw.starts_with("0x") || raw.len() != 42 {
        return Err(AppError::InvalidRequest("Invalid address format".to_string()));
    }
    raw.parse::<Address>()
        .map_err(|_| AppError::InvalidRequest("Invalid address format".to_string()))
}

/// GET /health
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Build the API router with all endpoints.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        // Auth endpoints
        .route("/auth/nonce", post(auth::request_nonce))
        .route("/auth/verify", post(auth::verify))
        .route("/auth/legacy", post(auth::legacy_login))
        .route("/auth/session", get(auth::session))
        // Member endpoints
        .route("/member/profile", get(member::profile))
        .route("/member/forum", get(member::forum))
        .route("/member/proposals", post(member::create_proposal))
        .fallback(|| async { AppError::NotFound })
}

/// The full application: routes, per-identity rate limiting, CORS and
/// security headers.
pub fn build_app(state: AppState) -> Router {
    let cors = if state.config.cors_allow_any_origin {
        // Agents call from arbitrary origins with bearer tokens, never cookies
        CorsLayer::permissive()
    } else {
        // No allowed origins: rejects all CORS preflight requests
        CorsLayer::new()
    };

    api_router()
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(cors)
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}
