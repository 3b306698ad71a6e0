//! Error types and Axum response conversions.

use crate::auth::session::SessionError;
use crate::storage::StoreError;
use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::json;

/// Application error types.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Nonce rejected")]
    NonceRejected,

    #[error("Invalid signature")]
    SignatureInvalid,

    #[error("Message expired")]
    MessageExpired,

    #[error("Forbidden: {0}")]
    CapabilityDenied(String),

    #[error("Rate limited until {reset_at}")]
    RateLimited {
        limit: u64,
        reset_at: DateTime<Utc>,
        retry_after: u64,
    },

    #[error("Not found")]
    NotFound,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code for clients.
    pub fn reason(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::NonceRejected => "nonce_rejected",
            AppError::SignatureInvalid => "signature_invalid",
            AppError::MessageExpired => "message_expired",
            AppError::CapabilityDenied(_) => "capability_denied",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::NotFound => "not_found",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_)
            | AppError::NonceRejected
            | AppError::SignatureInvalid
            | AppError::MessageExpired => StatusCode::UNAUTHORIZED,
            AppError::CapabilityDenied(_) => StatusCode::FORBIDDEN,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal(msg) => {
                // Log detailed error server-side, return generic message to client
                tracing::error!(error = %msg, "Internal server error");
                "Internal server error".to_string()
            }
            AppError::InvalidRequest(msg)
            | AppError::Unauthorized(msg)
            | AppError::CapabilityDenied(msg) => msg.clone(),
            AppError::NonceRejected => "Nonce is invalid, expired, or already used".to_string(),
            AppError::SignatureInvalid => "Signature does not match the claimed address".to_string(),
            AppError::MessageExpired => "Message has expired".to_string(),
            AppError::RateLimited { .. } => "Rate limit exceeded".to_string(),
            AppError::NotFound => "Not found".to_string(),
        };

        let mut body = json!({
            "error": message,
            "reason": self.reason(),
        });
        if let AppError::RateLimited { reset_at, .. } = &self {
            body["resetAt"] = json!(reset_at.timestamp());
        }

        let mut response = (status, Json(body)).into_response();
        if let AppError::RateLimited {
            limit,
            reset_at,
            retry_after,
        } = &self
        {
            let headers = response.headers_mut();
            headers.insert("retry-after", HeaderValue::from(*retry_after));
            headers.insert("x-ratelimit-limit", HeaderValue::from(*limit));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(0u64));
            headers.insert("x-ratelimit-reset", HeaderValue::from(reset_at.timestamp()));
        }
        response
    }
}

// Convenience conversions from component error types
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Internal(format!("Store error: {}", err))
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        AppError::Internal(format!("Session error: {}", err))
    }
}
