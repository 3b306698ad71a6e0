//! Auth API endpoints.

use super::parse_address;
use crate::auth::middleware::{AppState, AuthSession};
use crate::error::AppError;
use crate::middleware::ClientIp;
use crate::models::{
    LegacyRequest, LegacyResponse, NonceRequest, NonceResponse, SessionResponse, VerifyRequest,
    VerifyResponse,
};
use axum::{extract::State, response::IntoResponse, Json};

fn require_signed(message: &str, signature: &str) -> Result<(), AppError> {
    if message.trim().is_empty() || signature.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "message and signature are required".to_string(),
        ));
    }
    Ok(())
}

/// POST /auth/nonce - Request a challenge for an address
pub async fn request_nonce(
    State(state): State<AppState>,
    client: ClientIp,
    Json(req): Json<NonceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let address = parse_address(&req.address)?;

    let challenge = state
        .auth
        .issue_challenge(client.as_str(), address, req.agent_id)
        .await?;
    let expires_in = state.auth.nonces.ttl().num_seconds().max(0) as u64;

    Ok(Json(NonceResponse {
        message: challenge.build(),
        nonce: challenge.nonce,
        domain: challenge.domain,
        issued_at: challenge.issued_at,
        expiration_time: challenge.expiration_time,
        expires_in,
    }))
}

/// POST /auth/verify - Verify a signed challenge and create a session
pub async fn verify(
    State(state): State<AppState>,
    client: ClientIp,
    Json(req): Json<VerifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_signed(&req.message, &req.signature)?;

    let issued = state
        .auth
        .authenticate(client.as_str(), &req.message, &req.signature)
        .await?;
    let payload = issued.payload;
    let caps = payload.capabilities;

    Ok(Json(VerifyResponse {
        token: issued.token,
        expires_in: state.auth.sessions.ttl().num_seconds().max(0) as u64,
        address: payload.address,
        agent_id: payload.agent_id,
        is_holder: caps.is_holder,
        is_delegated: caps.is_delegated,
        is_registered_agent: caps.is_registered_agent,
        voting_power: caps.voting_power,
    }))
}

/// POST /auth/legacy - Signature-only login (legacy tier)
pub async fn legacy_login(
    State(state): State<AppState>,
    client: ClientIp,
    Json(req): Json<LegacyRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_signed(&req.message, &req.signature)?;

    let issued = state
        .auth
        .authenticate_legacy(client.as_str(), &req.message, &req.signature, req.agent_id)
        .await?;

    Ok(Json(LegacyResponse {
        token: issued.token,
        expires_in: state.auth.sessions.ttl().num_seconds().max(0) as u64,
        address: issued.payload.address,
        agent_id: issued.payload.agent_id,
        tier: issued.payload.tier,
    }))
}

/// GET /auth/session - Decode the presented session
pub async fn session(AuthSession(session): AuthSession) -> impl IntoResponse {
    Json(SessionResponse {
        valid: true,
        session,
    })
}
