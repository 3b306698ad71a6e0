//! Fixed-window request limiting per identity.

use crate::clock::Clock;
use crate::error::AppError;
use crate::storage::{RateLimitStore, StoreError};
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;

/// Outcome of one counted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Whole seconds until the window resets, at least 1.
    pub fn retry_after(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_at - now).num_milliseconds().max(0) as u64;
        millis.div_ceil(1000).max(1)
    }

    /// Reject with `RateLimited` when over the limit.
    pub fn into_result(self, now: DateTime<Utc>) -> Result<Self, AppError> {
        if self.allowed {
            Ok(self)
        } else {
            Err(AppError::RateLimited {
                limit: self.limit,
                reset_at: self.reset_at,
                retry_after: self.retry_after(now),
            })
        }
    }
}

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    /// Key namespace so independent quotas can share a store.
    scope: &'static str,
    limit: u64,
    window: TimeDelta,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
        scope: &'static str,
        limit: u64,
        window: TimeDelta,
    ) -> Self {
        Self {
            store,
            clock,
            scope,
            limit,
            window,
        }
    }

    /// Count a request against `identity` (case-insensitive). Every call
    /// consumes quota, allowed or not.
    pub async fn check(&self, identity: &str) -> Result<RateLimitDecision, AppError> {
        let key = format!("ratelimit:{}:{}", self.scope, identity.trim().to_lowercase());
        let state = self
            .store
            .hit(&key, self.window, self.clock.now())
            .await
            .map_err(|e| AppError::Internal(format!("Rate limit check failed: {}", e)))?;

        Ok(RateLimitDecision {
            allowed: state.count <= self.limit,
            limit: self.limit,
            remaining: self.limit.saturating_sub(state.count),
            reset_at: state.reset_at,
        })
    }

    /// `check`, then reject over-limit requests.
    pub async fn enforce(&self, identity: &str) -> Result<RateLimitDecision, AppError> {
        let decision = self.check(identity).await?;
        if !decision.allowed {
            tracing::warn!(
                action = "rate_limited",
                scope = self.scope,
                identity = %identity.to_lowercase(),
                "Rate limit exceeded"
            );
        }
        decision.into_result(self.clock.now())
    }

    /// Drop closed windows from the backing store.
    pub async fn sweep(&self) -> Result<usize, StoreError> {
        self.store.sweep(self.clock.now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryRateLimitStore;

    fn limiter(limit: u64) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let limiter = RateLimiter::new(
            Arc::new(MemoryRateLimitStore::new()),
            clock.clone(),
            "api",
            limit,
            TimeDelta::seconds(60),
        );
        (limiter, clock)
    }

    #[tokio::test]
    async fn test_nth_allowed_next_denied_then_fresh_window() {
        let (limiter, clock) = limiter(3);

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.check("0xabc").await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let denied = limiter.check("0xabc").await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);

        clock.set(denied.reset_at);
        let fresh = limiter.check("0xabc").await.unwrap();
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 2);
    }

    #[tokio::test]
    async fn test_keys_are_case_insensitive() {
        let (limiter, _) = limiter(1);
        assert!(limiter.check("0xABCDEF").await.unwrap().allowed);
        assert!(!limiter.check("0xabcdef").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_identities_are_independent() {
        let (limiter, _) = limiter(1);
        assert!(limiter.check("alice").await.unwrap().allowed);
        assert!(limiter.check("bob").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_enforce_returns_rate_limited() {
        let (limiter, _) = limiter(1);
        limiter.enforce("0x1").await.unwrap();

        match limiter.enforce("0x1").await {
            Err(AppError::RateLimited {
                limit, retry_after, ..
            }) => {
                assert_eq!(limit, 1);
                assert_eq!(retry_after, 60);
            }
            other => panic!("expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let now = Utc::now();
        let decision = RateLimitDecision {
            allowed: false,
            limit: 1,
            remaining: 0,
            reset_at: now + TimeDelta::milliseconds(1500),
        };
        assert_eq!(decision.retry_after(now), 2);
        assert_eq!(decision.retry_after(now + TimeDelta::seconds(5)), 1);
    }
}
