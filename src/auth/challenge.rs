//! The challenge/response flow: issue a nonce and message, then turn a signed
//! message into a session.

use super::message::{parse_legacy, ChallengeMessage, ChallengeParams};
use super::nonce::NonceRegistry;
use super::session::{IssuedSession, SessionManager};
use super::verify::SignatureVerifier;
use crate::capability::{AgentOwnership, CapabilityResolver};
use crate::clock::Clock;
use crate::error::AppError;
use crate::models::{identity_key, CapabilitySnapshot, SessionTier};
use crate::ratelimit::RateLimiter;
use alloy_primitives::Address;
use chrono::TimeDelta;
use std::sync::Arc;

/// Statement line of every challenge.
pub const DEFAULT_STATEMENT: &str = "Sign in to the governance API as an autonomous agent.";

/// What a valid challenge must contain.
#[derive(Debug, Clone)]
pub struct ChallengeSettings {
    pub domain: String,
    pub uri: String,
    pub chain_id: u64,
    /// `eip155:{chain}:{registry}`.
    pub agent_registry: String,
    pub require_registered_agent: bool,
    /// How far in the future `Issued At` may be.
    pub max_clock_skew: TimeDelta,
}

pub struct Authenticator {
    pub nonces: NonceRegistry,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub resolver: Arc<CapabilityResolver>,
    pub sessions: SessionManager,
    /// Per client, separate from the general API quota. Keyed by the
    /// caller (normally `ip:{addr}`), never by the address a message claims.
    pub limiter: RateLimiter,
    pub clock: Arc<dyn Clock>,
    pub settings: ChallengeSettings,
}

impl Authenticator {
    /// Issue a nonce bound to `address` and the message it must sign.
    /// `client` is the quota identity of the caller.
    pub async fn issue_challenge(
        &self,
        client: &str,
        address: Address,
        agent_id: Option<u64>,
    ) -> Result<ChallengeMessage, AppError> {
        self.limiter.enforce(client).await?;

        let nonce = self.nonces.issue(Some(address)).await?;
        let message = ChallengeMessage::new(ChallengeParams {
            domain: self.settings.domain.clone(),
            address,
            statement: Some(DEFAULT_STATEMENT.to_string()),
            uri: Some(self.settings.uri.clone()),
            agent_id,
            agent_registry: agent_id.map(|_| self.settings.agent_registry.clone()),
            chain_id: self.settings.chain_id,
            nonce: nonce.value,
            issued_at: nonce.issued_at,
        });

        tracing::info!(action = "nonce_issued", address = %identity_key(&address), agent_id = ?agent_id, client = %client, "Challenge issued");
        Ok(message)
    }

    /// Verify a signed challenge and mint a session carrying fresh capabilities.
    pub async fn authenticate(
        &self,
        client: &str,
        message: &str,
        signature: &str,
    ) -> Result<IssuedSession, AppError> {
        self.limiter.enforce(client).await?;

        let parsed = ChallengeMessage::parse(message).map_err(|e| {
            tracing::warn!(action = "auth_failed", reason = "invalid_request", error = %e, client = %client, "Unparseable challenge");
            AppError::InvalidRequest(format!("Invalid message: {}", e))
        })?;
        let address = parsed.address;

        let result = self.authenticate_parsed(&parsed, message, signature).await;
        match &result {
            Ok(issued) => {
                let caps = &issued.payload.capabilities;
                tracing::info!(
                    action = "auth_success",
                    address = %identity_key(&address),
                    agent_id = ?issued.payload.agent_id,
                    is_holder = caps.is_holder,
                    is_delegated = caps.is_delegated,
                    is_registered_agent = caps.is_registered_agent,
                    "Agent authenticated"
                );
            }
            Err(e) => {
                tracing::warn!(action = "auth_failed", reason = e.reason(), address = %identity_key(&address), client = %client, "Authentication rejected");
            }
        }
        result
    }

    async fn authenticate_parsed(
        &self,
        parsed: &ChallengeMessage,
        message: &str,
        signature: &str,
    ) -> Result<IssuedSession, AppError> {
        if parsed.domain != self.settings.domain {
            return Err(AppError::InvalidRequest("Domain mismatch".to_string()));
        }
        if parsed.chain_id != self.settings.chain_id {
            return Err(AppError::InvalidRequest("Chain ID mismatch".to_string()));
        }
        if let Some(registry) = &parsed.agent_registry {
            if *registry != self.settings.agent_registry {
                return Err(AppError::InvalidRequest("Agent registry mismatch".to_string()));
            }
        }

        // Time checks come before any signature work
        let now = self.clock.now();
        if parsed.is_expired(now) {
            return Err(AppError::MessageExpired);
        }
        if parsed.issued_at > now + self.settings.max_clock_skew {
            return Err(AppError::InvalidRequest(
                "Message issued in the future".to_string(),
            ));
        }

        if !self.verifier.verify(message, signature, parsed.address) {
            return Err(AppError::SignatureInvalid);
        }

        // Only a proven signer can burn the nonce
        if !self.nonces.consume(&parsed.nonce, Some(parsed.address)).await {
            return Err(AppError::NonceRejected);
        }

        let (capabilities, agent_id) = tokio::join!(
            self.resolver.resolve(parsed.address),
            self.confirm_agent(parsed.address, parsed.agent_id),
        );
        let agent_id = agent_id?;

        if self.settings.require_registered_agent && !capabilities.is_registered_agent {
            tracing::warn!(action = "capability_denied", address = %identity_key(&parsed.address), "Agent not in registry");
            return Err(AppError::CapabilityDenied(
                "Agent is not registered".to_string(),
            ));
        }

        Ok(self.sessions.issue(
            parsed.address,
            agent_id,
            SessionTier::Agent,
            capabilities,
        )?)
    }

    /// Check a claimed agent id against the registry's `ownerOf`.
    ///
    /// Another owner is a hard rejection. When the registry cannot answer,
    /// the id is dropped from the session rather than carried unverified.
    async fn confirm_agent(
        &self,
        address: Address,
        agent_id: Option<u64>,
    ) -> Result<Option<u64>, AppError> {
        let Some(id) = agent_id else {
            return Ok(None);
        };
        match self.resolver.verify_agent(address, id).await {
            AgentOwnership::Owned => Ok(Some(id)),
            AgentOwnership::NotOwned => Err(AppError::Unauthorized(
                "Agent ID is not owned by the signer".to_string(),
            )),
            AgentOwnership::Unknown => {
                tracing::warn!(
                    action = "capability_degraded",
                    address = %identity_key(&address),
                    agent_id = id,
                    "Agent ownership unverifiable, dropping agent id"
                );
                Ok(None)
            }
        }
    }

    /// Signature-only login. The message must carry `Address:` and a live
    /// `Nonce:` line. The session is `legacy` tier and carries no capabilities.
    pub async fn authenticate_legacy(
        &self,
        client: &str,
        message: &str,
        signature: &str,
        agent_id: Option<u64>,
    ) -> Result<IssuedSession, AppError> {
        self.limiter.enforce(client).await?;

        let claims = parse_legacy(message)
            .map_err(|e| AppError::InvalidRequest(format!("Invalid message: {}", e)))?;
        let key = identity_key(&claims.address);

        if !self.verifier.verify(message, signature, claims.address) {
            tracing::warn!(action = "auth_failed", reason = "signature_invalid", address = %key, client = %client, tier = "legacy", "Authentication rejected");
            return Err(AppError::SignatureInvalid);
        }
        if !self.nonces.consume(&claims.nonce, Some(claims.address)).await {
            tracing::warn!(action = "auth_failed", reason = "nonce_rejected", address = %key, client = %client, tier = "legacy", "Authentication rejected");
            return Err(AppError::NonceRejected);
        }

        let agent_id = self.confirm_agent(claims.address, agent_id).await?;
        let issued = self.sessions.issue(
            claims.address,
            agent_id,
            SessionTier::Legacy,
            CapabilitySnapshot::none(self.clock.now()),
        )?;
        tracing::info!(action = "auth_success", address = %key, tier = "legacy", "Legacy login");
        Ok(issued)
    }
}
