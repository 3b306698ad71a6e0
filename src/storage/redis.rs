//! Redis-backed stores for multi-instance deployments.
//!
//! Redis key patterns:
//! - `nonce:{value}`: bound address (lowercase hex) or empty string, with `EX` = nonce TTL
//! - `ratelimit:{scope}:{identity}`: request counter, with `PX` = window length
//!
//! Expiry is left to Redis key TTLs, so `sweep` has nothing to do. Every
//! read-modify-write runs inside a Lua script so it is a single atomic step
//! on the server.

use super::{NonceStore, RateLimitStore, StoreError, WindowState};
use crate::models::{identity_key, StoredNonce};
use alloy_primitives::Address;
use chrono::{DateTime, TimeDelta, Utc};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

/// Redeem a nonce only when the binding matches; a mismatch leaves it in place.
const TAKE_NONCE_SCRIPT: &str = r"
local bound = redis.call('GET', KEYS[1])
if not bound then
    return 0
end
if bound ~= '' and bound ~= ARGV[1] then
    return 0
end
redis.call('DEL', KEYS[1])
return 1
";

/// INCR with the window TTL set on the first hit; returns count and remaining ms.
const HIT_SCRIPT: &str = r"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
";

fn nonce_key(value: &str) -> String {
    format!("nonce:{}", value)
}

pub struct RedisNonceStore {
    con: MultiplexedConnection,
    take_script: redis::Script,
}

impl RedisNonceStore {
    pub fn new(con: MultiplexedConnection) -> Self {
        Self {
            con,
            take_script: redis::Script::new(TAKE_NONCE_SCRIPT),
        }
    }
}

#[async_trait::async_trait]
impl NonceStore for RedisNonceStore {
    async fn insert(&self, entry: &StoredNonce, ttl: TimeDelta) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        let bound = entry
            .bound_address
            .as_ref()
            .map(identity_key)
            .unwrap_or_default();
        let ttl_secs = ttl.num_seconds().max(1) as u64;

        con.set_ex::<_, _, ()>(nonce_key(&entry.value), bound, ttl_secs)
            .await?;
        Ok(())
    }

    async fn take(
        &self,
        value: &str,
        expected: Option<Address>,
        _now: DateTime<Utc>,
        _ttl: TimeDelta,
    ) -> Result<bool, StoreError> {
        let mut con = self.con.clone();
        let expected = expected.as_ref().map(identity_key).unwrap_or_default();

        let taken: i64 = self
            .take_script
            .key(nonce_key(value))
            .arg(expected)
            .invoke_async(&mut con)
            .await?;
        Ok(taken == 1)
    }

    async fn sweep(&self, _now: DateTime<Utc>, _ttl: TimeDelta) -> Result<usize, StoreError> {
        Ok(0)
    }
}

pub struct RedisRateLimitStore {
    con: MultiplexedConnection,
    hit_script: redis::Script,
}

impl RedisRateLimitStore {
    pub fn new(con: MultiplexedConnection) -> Self {
        Self {
            con,
            hit_script: redis::Script::new(HIT_SCRIPT),
        }
    }
}

#[async_trait::async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn hit(
        &self,
        key: &str,
        window: TimeDelta,
        now: DateTime<Utc>,
    ) -> Result<WindowState, StoreError> {
        let mut con = self.con.clone();
        let window_ms = window.num_milliseconds().max(1);

        let (count, ttl_ms): (i64, i64) = self
            .hit_script
            .key(key)
            .arg(window_ms)
            .invoke_async(&mut con)
            .await?;

        let count = u64::try_from(count)
            .map_err(|_| StoreError::Corrupt(format!("negative counter for {}", key)))?;

        Ok(WindowState {
            count,
            reset_at: now + TimeDelta::milliseconds(ttl_ms),
        })
    }

    async fn sweep(&self, _now: DateTime<Utc>) -> Result<usize, StoreError> {
        Ok(0)
    }
}
