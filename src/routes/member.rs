//! Capability-gated member endpoints.

use crate::auth::middleware::{HolderSession, MemberSession};
use crate::models::{AccessResponse, ProfileResponse};
use axum::{response::IntoResponse, Json};

/// GET /member/profile - Holder or delegatee
pub async fn profile(MemberSession(session): MemberSession) -> impl IntoResponse {
    let caps = session.capabilities;
    Json(ProfileResponse {
        address: session.address,
        agent_id: session.agent_id,
        is_holder: caps.is_holder,
        direct_balance: caps.direct_balance,
        is_delegated: caps.is_delegated,
        voting_power: caps.voting_power,
    })
}

/// GET /member/forum - Holder or delegatee
pub async fn forum(MemberSession(_session): MemberSession) -> impl IntoResponse {
    Json(AccessResponse {
        message: "Member forum access granted".to_string(),
        author: None,
    })
}

/// POST /member/proposals - Direct holders only
pub async fn create_proposal(HolderSession(session): HolderSession) -> impl IntoResponse {
    tracing::info!(action = "proposal_create", author = %session.address, "Holder proposal accepted");
    Json(AccessResponse {
        message: "Proposal creation endpoint (holder-only)".to_string(),
        author: Some(session.address),
    })
}
