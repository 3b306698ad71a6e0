//! Self-contained session credentials.
//!
//! A credential is an HS256 JWT whose claims carry the session payload.
//! Validity depends only on the signature, the issuer and the embedded
//! expiry; there is no server-side session table and no revocation.

use crate::clock::Clock;
use crate::models::{identity_key, CapabilitySnapshot, SessionPayload, SessionTier};
use alloy_primitives::Address;
use chrono::TimeDelta;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Issuer embedded in every credential.
pub const SESSION_ISSUER: &str = "anons-dao";

/// Minimum accepted secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

const SESSION_ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session secret must be at least 32 bytes")]
    WeakSecret,

    #[error("failed to encode session: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),
}

/// A freshly minted credential and what it carries.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub payload: SessionPayload,
}

/// JWT claims. `exp` is checked against the injected clock, not by the
/// decoder, so expiry follows the same time source as everything else.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionClaims {
    sub: String,
    iss: String,
    iat: i64,
    exp: i64,
    address: Address,
    agent_id: Option<u64>,
    tier: SessionTier,
    capabilities: CapabilitySnapshot,
}

impl From<&SessionPayload> for SessionClaims {
    fn from(payload: &SessionPayload) -> Self {
        Self {
            sub: identity_key(&payload.address),
            iss: payload.issuer.clone(),
            iat: payload.issued_at,
            exp: payload.expires_at,
            address: payload.address,
            agent_id: payload.agent_id,
            tier: payload.tier,
            capabilities: payload.capabilities.clone(),
        }
    }
}

impl From<SessionClaims> for SessionPayload {
    fn from(claims: SessionClaims) -> Self {
        Self {
            address: claims.address,
            agent_id: claims.agent_id,
            tier: claims.tier,
            capabilities: claims.capabilities,
            issuer: claims.iss,
            issued_at: claims.iat,
            expires_at: claims.exp,
        }
    }
}

/// Mints and validates session credentials.
pub struct SessionManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    pub fn new(secret: &[u8], ttl: TimeDelta, clock: Arc<dyn Clock>) -> Result<Self, SessionError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(SessionError::WeakSecret);
        }

        let mut validation = Validation::new(SESSION_ALGORITHM);
        validation.set_issuer(&[SESSION_ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.validate_exp = false;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
            clock,
        })
    }

    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    /// Mint a credential embedding `capabilities` as observed right now.
    pub fn issue(
        &self,
        address: Address,
        agent_id: Option<u64>,
        tier: SessionTier,
        capabilities: CapabilitySnapshot,
    ) -> Result<IssuedSession, SessionError> {
        let now = self.clock.now();
        let payload = SessionPayload {
            address,
            agent_id,
            tier,
            capabilities,
            issuer: SESSION_ISSUER.to_string(),
            issued_at: now.timestamp(),
            expires_at: (now + self.ttl).timestamp(),
        };

        let token = encode(
            &Header::new(SESSION_ALGORITHM),
            &SessionClaims::from(&payload),
            &self.encoding_key,
        )?;

        Ok(IssuedSession { token, payload })
    }

    /// Decode a credential. Returns `None` for anything tampered, malformed,
    /// foreign, or expired.
    pub fn validate(&self, token: &str) -> Option<SessionPayload> {
        let claims = match decode::<SessionClaims>(token.trim(), &self.decoding_key, &self.validation)
        {
            Ok(data) => data.claims,
            Err(e) => {
                tracing::debug!(error = ?e.kind(), "Rejected session token");
                return None;
            }
        };

        if self.clock.now().timestamp() >= claims.exp {
            tracing::debug!(address = %claims.sub, "Expired session token");
            return None;
        }
        Some(claims.into())
    }
}
