//! Application state and Axum extractors for the authorization tiers.

use super::challenge::{Authenticator, ChallengeSettings};
use super::nonce::NonceRegistry;
use super::policy::{self, Tier};
use super::session::{SessionError, SessionManager};
use super::verify::{Eip191Verifier, SignatureVerifier};
use crate::capability::{CapabilityResolver, ContractSet, LedgerQuery, ResolverSettings};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::AppError;
use crate::models::{identity_key, SessionPayload};
use crate::ratelimit::RateLimiter;
use crate::storage::{MemoryNonceStore, MemoryRateLimitStore, NonceStore, RateLimitStore};
use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::TimeDelta;
use std::sync::Arc;
use std::time::Duration;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: Arc<Authenticator>,
    /// General per-identity quota applied to every request.
    pub api_limiter: Arc<RateLimiter>,
    pub clock: Arc<dyn Clock>,
}

/// Pluggable collaborators behind the state.
pub struct Backends {
    pub nonces: Arc<dyn NonceStore>,
    pub rate_limits: Arc<dyn RateLimitStore>,
    pub ledger: Option<Arc<dyn LedgerQuery>>,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub clock: Arc<dyn Clock>,
}

impl Backends {
    /// Process-local stores, EIP-191 verification and wall-clock time.
    pub fn in_memory(ledger: Option<Arc<dyn LedgerQuery>>) -> Self {
        Self {
            nonces: Arc::new(MemoryNonceStore::new()),
            rate_limits: Arc::new(MemoryRateLimitStore::new()),
            ledger,
            verifier: Arc::new(Eip191Verifier),
            clock: Arc::new(SystemClock),
        }
    }
}

/// Durations are capped at ten years so timestamp arithmetic cannot overflow.
const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 3600;

fn secs(value: u64) -> TimeDelta {
    TimeDelta::seconds(value.min(MAX_DURATION_SECS) as i64)
}

impl AppState {
    pub fn new(config: Config, backends: Backends) -> Result<Self, SessionError> {
        let clock = backends.clock;

        let resolver = CapabilityResolver::new(
            backends.ledger,
            ContractSet {
                token: config.token_contract,
                delegation: config.delegation_contract,
                registry: config.agent_registry,
            },
            ResolverSettings {
                cache_ttl: secs(config.capability_cache_ttl_secs),
                query_timeout: Duration::from_millis(config.ledger_query_timeout_ms),
                deadline: Duration::from_millis(config.ledger_deadline_ms),
            },
            clock.clone(),
        );

        let sessions = SessionManager::new(
            config.session_secret.as_bytes(),
            secs(config.session_ttl_secs),
            clock.clone(),
        )?;

        let window = secs(config.rate_limit_window_secs);
        let auth = Authenticator {
            nonces: NonceRegistry::new(backends.nonces, clock.clone(), secs(config.nonce_ttl_secs)),
            verifier: backends.verifier,
            resolver: Arc::new(resolver),
            sessions,
            limiter: RateLimiter::new(
                backends.rate_limits.clone(),
                clock.clone(),
                "auth",
                config.rate_limit_auth_per_window,
                window,
            ),
            clock: clock.clone(),
            settings: ChallengeSettings {
                domain: config.api_domain.clone(),
                uri: config.api_uri.clone(),
                chain_id: config.chain_id,
                agent_registry: config.agent_registry_id(),
                require_registered_agent: config.require_registered_agent,
                max_clock_skew: TimeDelta::seconds(60),
            },
        };

        let api_limiter = RateLimiter::new(
            backends.rate_limits,
            clock.clone(),
            "api",
            config.rate_limit_per_window,
            window,
        );

        Ok(Self {
            config: Arc::new(config),
            auth: Arc::new(auth),
            api_limiter: Arc::new(api_limiter),
            clock,
        })
    }
}

/// Extract the bearer token from `Authorization`.
pub fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let header = parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".to_string()))?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization format".to_string()))
}

/// Authenticated session extractor (`requireAuth`).
///
/// Uses the payload the rate-limit layer already validated when present,
/// otherwise validates `Authorization: Bearer {token}` itself.
/// Returns 401 Unauthorized if missing or invalid.
pub struct AuthSession(pub SessionPayload);

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<SessionPayload>() {
            return Ok(AuthSession(session.clone()));
        }

        let token = bearer_token(parts)?;
        let session = state
            .auth
            .sessions
            .validate(token)
            .ok_or_else(|| AppError::Unauthorized("Invalid or expired session".to_string()))?;

        Ok(AuthSession(session))
    }
}

/// Member-only session extractor (`requireMember`): holder or delegatee.
/// Returns 403 Forbidden otherwise.
pub struct MemberSession(pub SessionPayload);

impl FromRequestParts<AppState> for MemberSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthSession(session) = AuthSession::from_request_parts(parts, state).await?;

        let granted = policy::tier_of(Some(&session));
        if granted < Tier::Member {
            tracing::warn!(
                action = "capability_denied",
                address = %identity_key(&session.address),
                required = ?Tier::Member,
                granted = ?granted,
                tier = %session.tier,
                "Member access denied"
            );
            return Err(AppError::CapabilityDenied(
                "Member access required: must hold or be delegated a governance token"
                    .to_string(),
            ));
        }

        Ok(MemberSession(session))
    }
}

/// Holder-only session extractor (`requireHolder`).
///
/// With `holder_recheck` on, a fresher snapshot in the capability cache
/// overrides the session's, so a holder whose sale was observed by a later
/// resolution loses access. This never queries the ledger: on a cache miss
/// the session snapshot stands.
pub struct HolderSession(pub SessionPayload);

impl FromRequestParts<AppState> for HolderSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthSession(session) = AuthSession::from_request_parts(parts, state).await?;

        let granted = policy::tier_of(Some(&session));
        let mut allowed = granted == Tier::Holder;
        if allowed && state.config.holder_recheck {
            if let Some(current) = state.auth.resolver.cached(&session.address) {
                allowed = current.is_holder;
            }
        }

        if !allowed {
            tracing::warn!(
                action = "capability_denied",
                address = %identity_key(&session.address),
                required = ?Tier::Holder,
                granted = ?granted,
                tier = %session.tier,
                "Holder access denied"
            );
            return Err(AppError::CapabilityDenied(
                "Holder access required: must directly own a governance token".to_string(),
            ));
        }

        Ok(HolderSession(session))
    }
}
