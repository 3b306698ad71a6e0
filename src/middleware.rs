//! Request-level middleware: per-identity rate limiting and response headers.

use crate::auth::middleware::AppState;
use crate::error::AppError;
use crate::models::identity_key;
use crate::ratelimit::RateLimitDecision;
use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};

/// Resolve the client IP.
///
/// With `trusted_proxy_count` = N > 0, the N-th address from the right of
/// `X-Forwarded-For` is used (each trusted proxy appends one entry). With
/// N = 0, or when the header is short or malformed, the socket peer address
/// is used.
pub fn client_ip(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    trusted_proxy_count: usize,
) -> Option<IpAddr> {
    if trusted_proxy_count > 0 {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').map(str::trim).collect::<Vec<_>>())
            .unwrap_or_default();

        if forwarded.len() >= trusted_proxy_count {
            if let Ok(ip) = forwarded[forwarded.len() - trusted_proxy_count].parse::<IpAddr>() {
                return Some(ip);
            }
        }
    }
    peer
}

/// Quota identity of the caller's network origin: `ip:{addr}`, or
/// `ip:unknown` when no address is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl ClientIp {
    fn resolve(
        headers: &HeaderMap,
        extensions: &axum::http::Extensions,
        trusted_proxy_count: usize,
    ) -> Self {
        let peer = extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        match client_ip(headers, peer, trusted_proxy_count) {
            Some(ip) => ClientIp(format!("ip:{}", ip)),
            None => ClientIp("ip:unknown".to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Reuses the value the rate-limit layer resolved, if it ran.
impl FromRequestParts<AppState> for ClientIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(client) = parts.extensions.get::<ClientIp>() {
            return Ok(client.clone());
        }
        Ok(ClientIp::resolve(
            &parts.headers,
            &parts.extensions,
            state.config.trusted_proxy_count,
        ))
    }
}

fn set_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert(
        "x-ratelimit-reset",
        HeaderValue::from(decision.reset_at.timestamp()),
    );
}

/// Count every request against its identity before anything else runs.
///
/// The identity is the session address when the request carries a valid
/// bearer token (the decoded payload is stashed in the request extensions
/// for the auth extractors), otherwise the client IP. The resolved
/// [`ClientIp`] is stashed too; the auth endpoints charge their own quota
/// to it. Requests count whether or not they go on to authenticate.
pub async fn rate_limit(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let session = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|token| state.auth.sessions.validate(token));

    let client = ClientIp::resolve(
        request.headers(),
        request.extensions(),
        state.config.trusted_proxy_count,
    );
    let identity = match &session {
        Some(payload) => identity_key(&payload.address),
        None => client.0.clone(),
    };

    let decision = match state.api_limiter.check(&identity).await {
        Ok(decision) => decision,
        Err(e) => return e.into_response(),
    };

    if !decision.allowed {
        tracing::warn!(
            action = "rate_limited",
            scope = "api",
            identity = %identity,
            path = %request.uri().path(),
            "Rate limit exceeded"
        );
        let now = state.clock.now();
        return AppError::RateLimited {
            limit: decision.limit,
            reset_at: decision.reset_at,
            retry_after: decision.retry_after(now),
        }
        .into_response();
    }

    if let Some(payload) = session {
        request.extensions_mut().insert(payload);
    }
    request.extensions_mut().insert(client);

    let mut response = next.run(request).await;
    set_rate_limit_headers(response.headers_mut(), &decision);
    response
}

/// Headers every API response carries.
///
/// - **Cache-Control: no-store** - responses contain session tokens and
///   per-identity capability data
/// - **X-Content-Type-Options: nosniff**
/// - **Referrer-Policy: no-referrer**
/// - **X-Frame-Options: DENY**
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("cache-control", HeaderValue::from_static("no-store"));
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("referrer-policy", HeaderValue::from_static("no-referrer"));
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));

    response
}
