//! Capability resolution with a short-lived per-address cache.
//!
//! A resolution issues three ledger queries in parallel (direct balance,
//! delegated votes, registry membership). Each query has its own timeout and
//! the batch has an overall deadline. A failed query degrades to "absent"
//! instead of failing the resolution, and degraded snapshots are never
//! cached so the next request tries the ledger again.
//!
//! Concurrent misses for the same address share one ledger batch: the first
//! caller takes a per-address async lock, later callers wait on it and then
//! read the cache.

pub mod ledger;
pub mod rpc;

pub use ledger::{ContractSet, LedgerError, LedgerQuery};
pub use rpc::RpcLedger;

use crate::clock::Clock;
use crate::models::{identity_key, CapabilitySnapshot};
use alloy_primitives::{Address, U256};
use chrono::TimeDelta;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Where a snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Cache,
    Ledger,
    /// Some or all facts defaulted to absent. Not cached.
    Degraded,
}

/// Whether the registry confirms a claimed agent id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentOwnership {
    /// `ownerOf(agentId)` is the claimant.
    Owned,
    /// The registry names someone else.
    NotOwned,
    /// The registry could not be asked (no transport, failure, timeout).
    Unknown,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub snapshot: CapabilitySnapshot,
    pub source: ResolutionSource,
}

#[derive(Debug, Clone, Copy)]
pub struct ResolverSettings {
    pub cache_ttl: TimeDelta,
    pub query_timeout: Duration,
    pub deadline: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            cache_ttl: TimeDelta::seconds(30),
            query_timeout: Duration::from_secs(3),
            deadline: Duration::from_secs(5),
        }
    }
}

pub struct CapabilityResolver {
    ledger: Option<Arc<dyn LedgerQuery>>,
    contracts: ContractSet,
    settings: ResolverSettings,
    clock: Arc<dyn Clock>,
    cache: DashMap<String, CapabilitySnapshot>,
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl CapabilityResolver {
    /// `ledger: None` means no transport is configured; every resolution
    /// then yields an all-absent snapshot.
    pub fn new(
        ledger: Option<Arc<dyn LedgerQuery>>,
        contracts: ContractSet,
        settings: ResolverSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            contracts,
            settings,
            clock,
            cache: DashMap::new(),
            inflight: DashMap::new(),
        }
    }

    /// Capability snapshot for `address`. Never fails.
    pub async fn resolve(&self, address: Address) -> CapabilitySnapshot {
        self.resolve_detailed(address).await.snapshot
    }

    pub async fn resolve_detailed(&self, address: Address) -> Resolution {
        let key = identity_key(&address);
        if let Some(snapshot) = self.cached_by_key(&key) {
            return Resolution {
                snapshot,
                source: ResolutionSource::Cache,
            };
        }

        let Some(ledger) = self.ledger.clone() else {
            tracing::debug!(address = %key, "No ledger transport configured");
            return Resolution {
                snapshot: CapabilitySnapshot::none(self.clock.now()),
                source: ResolutionSource::Degraded,
            };
        };

        let lock = self.inflight.entry(key.clone()).or_default().value().clone();
        let _guard = lock.lock().await;

        // Another caller may have filled the cache while we waited
        if let Some(snapshot) = self.cached_by_key(&key) {
            return Resolution {
                snapshot,
                source: ResolutionSource::Cache,
            };
        }

        let batch = self.query_ledger(ledger.as_ref(), address, &key);
        match tokio::time::timeout(self.settings.deadline, batch).await {
            Ok((snapshot, true)) => {
                self.cache.insert(key, snapshot.clone());
                Resolution {
                    snapshot,
                    source: ResolutionSource::Ledger,
                }
            }
            Ok((snapshot, false)) => Resolution {
                snapshot,
                source: ResolutionSource::Degraded,
            },
            Err(_) => {
                tracing::warn!(
                    action = "capability_degraded",
                    address = %key,
                    query = "all",
                    "Capability resolution missed its deadline"
                );
                Resolution {
                    snapshot: CapabilitySnapshot::none(self.clock.now()),
                    source: ResolutionSource::Degraded,
                }
            }
        }
    }

    /// Ask the registry who owns `agent_id`. Never cached, never fails.
    pub async fn verify_agent(&self, address: Address, agent_id: u64) -> AgentOwnership {
        let Some(ledger) = self.ledger.as_ref() else {
            return AgentOwnership::Unknown;
        };
        let key = identity_key(&address);
        let owner = self
            .bounded(
                "agent_owner",
                &key,
                ledger.agent_owner(self.contracts.registry, agent_id),
            )
            .await;
        match owner {
            Some(owner) if owner == address => AgentOwnership::Owned,
            Some(_) => AgentOwnership::NotOwned,
            None => AgentOwnership::Unknown,
        }
    }

    /// Cached snapshot if present and unexpired. No ledger access.
    pub fn cached(&self, address: &Address) -> Option<CapabilitySnapshot> {
        self.cached_by_key(&identity_key(address))
    }

    pub fn invalidate(&self, address: &Address) {
        self.cache.remove(&identity_key(address));
    }

    /// Drop expired cache entries and idle per-address locks.
    /// Returns how many cache entries were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.settings.cache_ttl;
        let mut removed = 0;
        self.cache.retain(|_, snapshot| {
            let keep = snapshot.resolved_at + ttl > now;
            if !keep {
                removed += 1;
            }
            keep
        });
        // A lock only the map references has no waiters
        self.inflight.retain(|_, lock| Arc::strong_count(lock) > 1);
        removed
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    fn cached_by_key(&self, key: &str) -> Option<CapabilitySnapshot> {
        let entry = self.cache.get(key)?;
        if entry.resolved_at + self.settings.cache_ttl > self.clock.now() {
            Some(entry.value().clone())
        } else {
            None
        }
    }

    /// Run the three queries in parallel. The flag is false when any of them
    /// defaulted.
    async fn query_ledger(
        &self,
        ledger: &dyn LedgerQuery,
        address: Address,
        key: &str,
    ) -> (CapabilitySnapshot, bool) {
        let contracts = self.contracts;
        let (balance, votes, registered) = tokio::join!(
            self.bounded("balance", key, ledger.balance_of(contracts.token, address)),
            self.bounded(
                "voting_power",
                key,
                ledger.voting_power(contracts.delegation, address)
            ),
            self.bounded(
                "registry",
                key,
                ledger.is_registered_member(contracts.registry, address)
            ),
        );

        let complete = balance.is_some() && votes.is_some() && registered.is_some();
        let snapshot = CapabilitySnapshot::compose(
            balance.unwrap_or(U256::ZERO),
            votes.unwrap_or(U256::ZERO),
            registered.unwrap_or(false),
            self.clock.now(),
        );
        (snapshot, complete)
    }

    async fn bounded<T>(
        &self,
        query: &'static str,
        key: &str,
        fut: impl Future<Output = Result<T, LedgerError>>,
    ) -> Option<T> {
        let result = match tokio::time::timeout(self.settings.query_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Timeout),
        };
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(
                    action = "capability_degraded",
                    address = %key,
                    query,
                    error = %e,
                    "Ledger query failed, treating as absent"
                );
                None
            }
        }
    }
}
