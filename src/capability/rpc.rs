//! Ledger queries through an alloy HTTP provider.

use super::ledger::{LedgerError, LedgerQuery};
use alloy::providers::RootProvider;
use alloy::sol;
use alloy::transports::RpcError;
use alloy_primitives::{Address, U256};
use std::future::Future;
use std::time::Duration;

sol! {
    #[sol(rpc)]
    interface IERC721 {
        function balanceOf(address owner) external view returns (uint256);
        function ownerOf(uint256 tokenId) external view returns (address);
    }

    #[sol(rpc)]
    interface IVotes {
        function getVotes(address account) external view returns (uint256);
    }
}

fn ledger_error(e: alloy::contract::Error) -> LedgerError {
    match e {
        alloy::contract::Error::TransportError(RpcError::ErrorResp(payload)) => LedgerError::Rpc {
            code: payload.code,
            message: payload.message.to_string(),
        },
        alloy::contract::Error::TransportError(e) => LedgerError::Transport(e.to_string()),
        // Empty return data from an address without code lands here too
        other => LedgerError::Decode(other.to_string()),
    }
}

pub struct RpcLedger {
    provider: RootProvider,
    timeout: Duration,
}

impl RpcLedger {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, LedgerError> {
        let url = url
            .parse()
            .map_err(|e| LedgerError::Transport(format!("invalid RPC URL: {}", e)))?;
        Ok(Self {
            provider: RootProvider::new_http(url),
            timeout,
        })
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, alloy::contract::Error>>,
    ) -> Result<T, LedgerError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(ledger_error),
            Err(_) => Err(LedgerError::Timeout),
        }
    }
}

#[async_trait::async_trait]
impl LedgerQuery for RpcLedger {
    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, LedgerError> {
        let contract = IERC721::new(token, self.provider.clone());
        self.bounded(async { contract.balanceOf(owner).call().await })
            .await
    }

    async fn voting_power(
        &self,
        delegation: Address,
        account: Address,
    ) -> Result<U256, LedgerError> {
        let contract = IVotes::new(delegation, self.provider.clone());
        self.bounded(async { contract.getVotes(account).call().await })
            .await
    }

    async fn agent_owner(&self, registry: Address, agent_id: u64) -> Result<Address, LedgerError> {
        let contract = IERC721::new(registry, self.provider.clone());
        self.bounded(async { contract.ownerOf(U256::from(agent_id)).call().await })
            .await
    }
}
