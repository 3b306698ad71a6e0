//! Process-local stores backed by sharded maps.
//!
//! `DashMap` takes a per-shard write lock for `remove_if` and `entry`, which
//! is what makes redeem and increment single atomic steps.

use super::{NonceStore, RateLimitStore, StoreError, WindowState};
use crate::models::StoredNonce;
use alloy_primitives::Address;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct MemoryNonceStore {
    entries: DashMap<String, StoredNonce>,
}

impl MemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn is_live(entry: &StoredNonce, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
    entry.issued_at + ttl > now
}

#[async_trait::async_trait]
impl NonceStore for MemoryNonceStore {
    async fn insert(&self, entry: &StoredNonce, _ttl: TimeDelta) -> Result<(), StoreError> {
        self.entries.insert(entry.value.clone(), entry.clone());
        Ok(())
    }

    async fn take(
        &self,
        value: &str,
        expected: Option<Address>,
        now: DateTime<Utc>,
        ttl: TimeDelta,
    ) -> Result<bool, StoreError> {
        let removed = self.entries.remove_if(value, |_, entry| {
            let bound_ok = match entry.bound_address {
                Some(bound) => expected == Some(bound),
                None => true,
            };
            bound_ok && is_live(entry, now, ttl)
        });
        Ok(removed.is_some())
    }

    async fn sweep(&self, now: DateTime<Utc>, ttl: TimeDelta) -> Result<usize, StoreError> {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = is_live(entry, now, ttl);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}

#[derive(Debug, Default)]
pub struct MemoryRateLimitStore {
    windows: DashMap<String, WindowState>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[async_trait::async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn hit(
        &self,
        key: &str,
        window: TimeDelta,
        now: DateTime<Utc>,
    ) -> Result<WindowState, StoreError> {
        let mut state = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| WindowState {
                count: 0,
                reset_at: now + window,
            });

        if state.reset_at <= now {
            state.count = 0;
            state.reset_at = now + window;
        }
        state.count += 1;

        Ok(*state)
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut removed = 0;
        self.windows.retain(|_, state| {
            let keep = state.reset_at > now;
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}
