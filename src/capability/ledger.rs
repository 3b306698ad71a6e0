//! Read-only view of on-chain state.

use alloy_primitives::{Address, U256};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("undecodable response: {0}")]
    Decode(String),

    #[error("query timed out")]
    Timeout,
}

/// Contracts the capability facts are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractSet {
    /// ERC-721 governance token; `balanceOf` > 0 means holder.
    pub token: Address,
    /// ERC20Votes-style source of `getVotes`.
    pub delegation: Address,
    /// ERC-8004 agent registry (ERC-721); any balance means registered,
    /// `ownerOf(agentId)` names the agent's controller.
    pub registry: Address,
}

/// Ledger query interface. Any call may fail.
#[async_trait::async_trait]
pub trait LedgerQuery: Send + Sync {
    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, LedgerError>;

    async fn voting_power(&self, delegation: Address, account: Address)
        -> Result<U256, LedgerError>;

    /// Current owner of agent `agent_id` in the registry.
    async fn agent_owner(&self, registry: Address, agent_id: u64) -> Result<Address, LedgerError>;

    async fn is_registered_member(
        &self,
        registry: Address,
        account: Address,
    ) -> Result<bool, LedgerError> {
        Ok(self.balance_of(registry, account).await? > U256::ZERO)
    }
}
