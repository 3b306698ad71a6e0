//! Single-use challenge nonces.

use crate::clock::Clock;
use crate::models::{identity_key, StoredNonce};
use crate::storage::{NonceStore, StoreError};
use alloy_primitives::Address;
use chrono::TimeDelta;
use rand::distr::{Alphanumeric, SampleString};
use std::sync::Arc;

/// Length of a nonce in alphanumeric characters (~190 bits of entropy).
pub const NONCE_LEN: usize = 32;

/// Generate a cryptographically random challenge nonce.
pub fn generate_challenge_nonce() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), NONCE_LEN)
}

/// Issues nonces and redeems each of them at most once.
pub struct NonceRegistry {
    store: Arc<dyn NonceStore>,
    clock: Arc<dyn Clock>,
    ttl: TimeDelta,
}

impl NonceRegistry {
    pub fn new(store: Arc<dyn NonceStore>, clock: Arc<dyn Clock>, ttl: TimeDelta) -> Self {
        Self { store, clock, ttl }
    }

    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    /// Issue a fresh nonce, optionally bound so only `bound` can redeem it.
    pub async fn issue(&self, bound: Option<Address>) -> Result<StoredNonce, StoreError> {
        let entry = StoredNonce {
            value: generate_challenge_nonce(),
            bound_address: bound,
            issued_at: self.clock.now(),
        };
        self.store.insert(&entry, self.ttl).await?;
        Ok(entry)
    }

    /// Redeem a nonce. Unknown, expired, already used, or bound to another
    /// address all return `false`, as does a store failure.
    pub async fn consume(&self, value: &str, expected: Option<Address>) -> bool {
        if value.is_empty() {
            return false;
        }

        match self
            .store
            .take(value, expected, self.clock.now(), self.ttl)
            .await
        {
            Ok(taken) => taken,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    address = %expected.as_ref().map(identity_key).unwrap_or_default(),
                    "Nonce store unavailable, rejecting"
                );
                false
            }
        }
    }

    /// Purge expired entries. Returns how many were removed.
    pub async fn sweep(&self) -> Result<usize, StoreError> {
        self.store.sweep(self.clock.now(), self.ttl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryNonceStore;

    fn registry() -> (NonceRegistry, Arc<ManualClock>, Arc<MemoryNonceStore>) {
        let store = Arc::new(MemoryNonceStore::new());
        let clock = Arc::new(ManualClock::default());
        let registry = NonceRegistry::new(store.clone(), clock.clone(), TimeDelta::minutes(5));
        (registry, clock, store)
    }

    #[test]
    fn test_generate_challenge_nonce() {
        let nonce = generate_challenge_nonce();
        assert_eq!(nonce.len(), NONCE_LEN);
        assert!(nonce.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_nonces_are_unique() {
        let nonce1 = generate_challenge_nonce();
        let nonce2 = generate_challenge_nonce();
        assert_ne!(nonce1, nonce2);
    }

    #[tokio::test]
    async fn test_consume_succeeds_exactly_once() {
        let (registry, _, _) = registry();
        let nonce = registry.issue(None).await.unwrap();

        assert!(registry.consume(&nonce.value, None).await);
        assert!(!registry.consume(&nonce.value, None).await);
    }

    #[tokio::test]
    async fn test_consume_unknown_and_empty() {
        let (registry, _, _) = registry();
        assert!(!registry.consume("doesnotexist", None).await);
        assert!(!registry.consume("", None).await);
    }

    #[tokio::test]
    async fn test_consume_after_expiry_fails() {
        let (registry, clock, _) = registry();
        let nonce = registry.issue(None).await.unwrap();

        clock.advance(TimeDelta::minutes(5));
        assert!(!registry.consume(&nonce.value, None).await);
    }

    #[tokio::test]
    async fn test_consume_just_before_expiry_succeeds() {
        let (registry, clock, _) = registry();
        let nonce = registry.issue(None).await.unwrap();

        clock.advance(TimeDelta::minutes(5) - TimeDelta::milliseconds(1));
        assert!(registry.consume(&nonce.value, None).await);
    }

    #[tokio::test]
    async fn test_bound_nonce_requires_matching_signer() {
        let (registry, _, _) = registry();
        let bound = Address::repeat_byte(0x42);
        let nonce = registry.issue(Some(bound)).await.unwrap();
        assert_eq!(nonce.bound_address, Some(bound));

        assert!(!registry.consume(&nonce.value, Some(Address::repeat_byte(0x43))).await);
        assert!(registry.consume(&nonce.value, Some(bound)).await);
    }

    #[tokio::test]
    async fn test_sweep_bounds_memory() {
        let (registry, clock, store) = registry();
        for _ in 0..10 {
            registry.issue(None).await.unwrap();
        }
        clock.advance(TimeDelta::minutes(1));
        let fresh = registry.issue(None).await.unwrap();

        clock.advance(TimeDelta::minutes(4) + TimeDelta::seconds(30));
        assert_eq!(registry.sweep().await.unwrap(), 10);
        assert_eq!(store.len(), 1);
        assert!(registry.consume(&fresh.value, None).await);
    }
}
