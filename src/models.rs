//! Request and response models for the API.
//!
//! All models use serde for serialization/deserialization. Wire models use
//! camelCase field names because the agent clients are JavaScript-first.
//! Storage models represent what the nonce store and session tokens carry.

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Identity
// ============================================================================

/// Case-insensitive key for an address: lowercase `0x`-prefixed hex.
pub fn identity_key(address: &Address) -> String {
    address.to_string().to_lowercase()
}

// ============================================================================
// Capabilities
// ============================================================================

/// What the ledger said about an identity at `resolved_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitySnapshot {
    pub is_holder: bool,
    #[serde(with = "u256_decimal")]
    pub direct_balance: U256,
    pub is_delegated: bool,
    #[serde(with = "u256_decimal")]
    pub voting_power: U256,
    pub is_registered_agent: bool,
    pub resolved_at: DateTime<Utc>,
}

impl CapabilitySnapshot {
    /// Snapshot with every capability absent. "Unknown" and "none" are
    /// indistinguishable to the authorization layer.
    pub fn none(resolved_at: DateTime<Utc>) -> Self {
        Self {
            is_holder: false,
            direct_balance: U256::ZERO,
            is_delegated: false,
            voting_power: U256::ZERO,
            is_registered_agent: false,
            resolved_at,
        }
    }

    /// Build a snapshot from raw ledger facts. Holder and delegate are
    /// mutually exclusive: delegated power only counts for non-holders.
    pub fn compose(
        direct_balance: U256,
        voting_power: U256,
        is_registered_agent: bool,
        resolved_at: DateTime<Utc>,
    ) -> Self {
        let is_holder = direct_balance > U256::ZERO;
        Self {
            is_holder,
            direct_balance,
            is_delegated: voting_power > U256::ZERO && !is_holder,
            voting_power,
            is_registered_agent,
            resolved_at,
        }
    }
}

/// Serialize `U256` as a decimal string so JavaScript clients keep precision.
pub mod u256_decimal {
    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        U256::from_str_radix(&raw, 10).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// How a session was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionTier {
    /// Full challenge/response with a capability snapshot.
    Agent,
    /// Signature-only login. Authenticated, never a member.
    Legacy,
}

impl SessionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionTier::Agent => "agent",
            SessionTier::Legacy => "legacy",
        }
    }
}

impl std::fmt::Display for SessionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything a session credential carries. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayload {
    pub address: Address,
    pub agent_id: Option<u64>,
    pub tier: SessionTier,
    pub capabilities: CapabilitySnapshot,
    pub issuer: String,
    /// Unix seconds.
    pub issued_at: i64,
    /// Unix seconds. The session is valid strictly before this instant.
    pub expires_at: i64,
}

// ============================================================================
// Auth Models
// ============================================================================

/// Request for a challenge nonce.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceRequest {
    #[serde(default)]
    pub address: String,
    pub agent_id: Option<u64>,
}

/// Challenge returned to the agent for signing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceResponse {
    pub nonce: String,
    pub message: String,
    pub domain: String,
    pub issued_at: DateTime<Utc>,
    pub expiration_time: DateTime<Utc>,
    /// Seconds.
    pub expires_in: u64,
}

/// Signed challenge submitted for verification.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub signature: String,
}

/// Session issued after a verified challenge.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub token: String,
    pub expires_in: u64,
    pub address: Address,
    pub agent_id: Option<u64>,
    pub is_holder: bool,
    pub is_delegated: bool,
    pub is_registered_agent: bool,
    #[serde(with = "u256_decimal")]
    pub voting_power: U256,
}

/// Signature-only login.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub signature: String,
    pub agent_id: Option<u64>,
}

/// Session issued by the legacy login.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyResponse {
    pub token: String,
    pub expires_in: u64,
    pub address: Address,
    pub agent_id: Option<u64>,
    pub tier: SessionTier,
}

/// Decoded session returned by `GET /auth/session`.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub valid: bool,
    #[serde(flatten)]
    pub session: SessionPayload,
}

// ============================================================================
// Member Models
// ============================================================================

/// Profile of an authenticated member.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub address: Address,
    pub agent_id: Option<u64>,
    pub is_holder: bool,
    #[serde(with = "u256_decimal")]
    pub direct_balance: U256,
    pub is_delegated: bool,
    #[serde(with = "u256_decimal")]
    pub voting_power: U256,
}

/// Acknowledgement from a member- or holder-gated endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<Address>,
}

// ============================================================================
// Storage Models
// ============================================================================

/// Nonce as held by the nonce store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredNonce {
    pub value: String,
    pub bound_address: Option<Address>,
    pub issued_at: DateTime<Utc>,
}
