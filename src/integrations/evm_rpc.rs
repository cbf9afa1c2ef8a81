use async_trait::async_trait;
use ethers::{
    providers::{Http, Middleware, Provider},
    types::{Address, U256},
};
use std::str::FromStr;

use crate::error::WalletError;

/// Native balance reads against an EVM JSON-RPC node.
#[async_trait]
pub trait EvmRpc: Send + Sync {
    async fn get_balance_wei(&self, address: &str) -> Result<u128, WalletError>;
}

#[derive(Debug, Clone)]
pub struct EthersEvmRpc {
    provider: Provider<Http>,
}

impl EthersEvmRpc {
    /// Constructs a new instance via `new`.
    ///
    /// # Arguments
    /// * `rpc_url` - HTTP endpoint of the mainnet node.
    ///
    /// # Returns
    /// * `Err(WalletError::Provider)` when the URL cannot be parsed.
    pub fn new(rpc_url: &str) -> Result<Self, WalletError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| WalletError::Provider(format!("Invalid EVM RPC URL: {}", e)))?;
        Ok(Self { provider })
    }
}

// Internal helper that supports `u256_to_u128` operations.
fn u256_to_u128(value: U256) -> Result<u128, WalletError> {
    if value > U256::from(u128::MAX) {
        return Err(WalletError::SourceUnavailable(
            "EVM balance exceeds supported range".to_string(),
        ));
    }
    Ok(value.as_u128())
}

#[async_trait]
impl EvmRpc for EthersEvmRpc {
    async fn get_balance_wei(&self, address: &str) -> Result<u128, WalletError> {
        let addr = Address::from_str(address.trim())
            .map_err(|_| WalletError::InvalidAddress(address.to_string()))?;
        let balance = self
            .provider
            .get_balance(addr, None)
            .await
            .map_err(|e| WalletError::SourceUnavailable(format!("eth_getBalance failed: {}", e)))?;
        u256_to_u128(balance)
    }
}
