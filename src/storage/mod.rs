//! Shared mutable state behind atomic-operation interfaces.
//!
//! Nonces and rate-limit counters are the only state that must be shared
//! across concurrent requests. Each store exposes operations that are atomic
//! per key, so callers never check-then-act. Two backends exist:
//!
//! - [`memory`]: process-local sharded maps (single instance).
//! - [`redis`]: Redis with native key TTLs (horizontally scaled instances).

pub mod memory;
pub mod redis;

use crate::models::StoredNonce;
use alloy_primitives::Address;
use chrono::{DateTime, TimeDelta, Utc};

pub use memory::{MemoryNonceStore, MemoryRateLimitStore};
pub use self::redis::{RedisNonceStore, RedisRateLimitStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Corrupt store entry: {0}")]
    Corrupt(String),
}

/// Single-use challenge values.
#[async_trait::async_trait]
pub trait NonceStore: Send + Sync {
    /// Record a freshly issued nonce that lives for `ttl`.
    async fn insert(&self, entry: &StoredNonce, ttl: TimeDelta) -> Result<(), StoreError>;

    /// Atomically redeem a nonce.
    ///
    /// Succeeds only if the nonce exists, has not outlived `ttl` at `now`, and,
    /// when it was bound to an address at issuance, `expected` is that address.
    /// On success the entry is gone; on failure nothing changes.
    async fn take(
        &self,
        value: &str,
        expected: Option<Address>,
        now: DateTime<Utc>,
        ttl: TimeDelta,
    ) -> Result<bool, StoreError>;

    /// Drop entries that have outlived `ttl`. Returns how many were removed.
    async fn sweep(&self, now: DateTime<Utc>, ttl: TimeDelta) -> Result<usize, StoreError>;
}

/// Counter state for one identity after a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    pub count: u64,
    pub reset_at: DateTime<Utc>,
}

/// Fixed-window request counters.
#[async_trait::async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Atomically count one request against `key`, opening a fresh window of
    /// length `window` if none is active at `now`.
    async fn hit(
        &self,
        key: &str,
        window: TimeDelta,
        now: DateTime<Utc>,
    ) -> Result<WindowState, StoreError>;

    /// Drop windows that closed before `now`. Returns how many were removed.
    async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}
