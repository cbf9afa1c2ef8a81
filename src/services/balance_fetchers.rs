use async_trait::async_trait;
use reqwest::{header, Client};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::constants::{
    BITCOIN_PROXY_TIMEOUT_SECS, EVM_MAINNET_CHAIN_ID, EVM_RPC_TIMEOUT_SECS,
    MAX_PLACEHOLDER_TOKENS, SOLANA_CHAIN_IDS, SOLANA_RPC_TIMEOUT_SECS, UPSTREAM_USER_AGENT,
};
use crate::error::WalletError;
use crate::integrations::{EvmRpc, SolanaRpc};
use crate::models::wallet::format_decimal;
use crate::models::{Balance, Ecosystem, TokenMap, TokenMetadata, WalletHandle};
use crate::utils::short_address;

/// Per-chain balance strategy.
#[async_trait]
pub trait BalanceFetcher: Send + Sync {
    fn ecosystem(&self) -> Ecosystem;

    async fn fetch(
        &self,
        wallet: &WalletHandle,
        tokens: &TokenMap,
    ) -> Result<Vec<Balance>, WalletError>;
}

// Internal helper that renders zero-amount rows for known tokens.
fn placeholder_rows<'a>(
    tokens: impl Iterator<Item = &'a TokenMetadata>,
    wallet: &WalletHandle,
) -> Vec<Balance> {
    let zero = wallet.ecosystem.zero_amount();
    tokens
        .map(|token| Balance::new(token.symbol.clone(), zero.clone(), wallet))
        .collect()
}

pub struct EvmBalanceFetcher {
    rpc: Arc<dyn EvmRpc>,
    timeout: Duration,
}

impl EvmBalanceFetcher {
    pub fn new(rpc: Arc<dyn EvmRpc>) -> Self {
        Self {
            rpc,
            timeout: Duration::from_secs(EVM_RPC_TIMEOUT_SECS),
        }
    }
}

#[async_trait]
impl BalanceFetcher for EvmBalanceFetcher {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Evm
    }

    async fn fetch(
        &self,
        wallet: &WalletHandle,
        tokens: &TokenMap,
    ) -> Result<Vec<Balance>, WalletError> {
        let wei = tokio::time::timeout(self.timeout, self.rpc.get_balance_wei(&wallet.address))
            .await
            .map_err(|_| WalletError::SourceUnavailable("EVM balance request timed out".to_string()))??;
        let amount = Ecosystem::Evm.format_base_units(wei).ok_or_else(|| {
            WalletError::SourceUnavailable("EVM balance out of range".to_string())
        })?;

        let mut balances = vec![Balance::new(Ecosystem::Evm.native_symbol(), amount, wallet)];
        // ERC-20 reads are out of scope; mainnet tokens are listed at zero.
        balances.extend(placeholder_rows(
            tokens
                .values()
                .filter(|token| token.chain_id == EVM_MAINNET_CHAIN_ID)
                .take(MAX_PLACEHOLDER_TOKENS),
            wallet,
        ));
        Ok(balances)
    }
}

pub struct SolanaBalanceFetcher {
    rpc: Arc<dyn SolanaRpc>,
    endpoints: Vec<String>,
    timeout: Duration,
}

impl SolanaBalanceFetcher {
    pub fn new(rpc: Arc<dyn SolanaRpc>, endpoints: Vec<String>) -> Self {
        Self::with_timeout(rpc, endpoints, Duration::from_secs(SOLANA_RPC_TIMEOUT_SECS))
    }

    pub fn with_timeout(rpc: Arc<dyn SolanaRpc>, endpoints: Vec<String>, timeout: Duration) -> Self {
        Self {
            rpc,
            endpoints,
            timeout,
        }
    }

    /// Tries each endpoint in order; the first success wins.
    async fn lamports(&self, address: &str) -> Result<u64, WalletError> {
        for endpoint in &self.endpoints {
            match tokio::time::timeout(self.timeout, self.rpc.get_balance_lamports(endpoint, address))
                .await
            {
                Ok(Ok(lamports)) => {
                    tracing::debug!("Solana balance from {}", endpoint);
                    return Ok(lamports);
                }
                Ok(Err(err)) => tracing::warn!("Failed to fetch from {}: {}", endpoint, err),
                Err(_) => tracing::warn!("Failed to fetch from {}: timed out", endpoint),
            }
        }
        Err(WalletError::AllEndpointsExhausted)
    }
}

fn is_solana_token(token: &TokenMetadata) -> bool {
    SOLANA_CHAIN_IDS.contains(&token.chain_id) || token.symbol.contains("SOL")
}

#[async_trait]
impl BalanceFetcher for SolanaBalanceFetcher {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Solana
    }

    async fn fetch(
        &self,
        wallet: &WalletHandle,
        tokens: &TokenMap,
    ) -> Result<Vec<Balance>, WalletError> {
        let amount = match self.lamports(&wallet.address).await {
            Ok(lamports) => Ecosystem::Solana
                .format_base_units(u128::from(lamports))
                .unwrap_or_else(|| Ecosystem::Solana.zero_amount()),
            Err(err) => {
                tracing::warn!(
                    "{} for {}, reporting zero balance",
                    err,
                    short_address(&wallet.address)
                );
                Ecosystem::Solana.zero_amount()
            }
        };

        let mut balances = vec![Balance::new(Ecosystem::Solana.native_symbol(), amount, wallet)];
        balances.extend(placeholder_rows(
            tokens
                .values()
                .filter(|token| is_solana_token(token))
                .take(MAX_PLACEHOLDER_TOKENS)
                .filter(|token| token.symbol != Ecosystem::Solana.native_symbol()),
            wallet,
        ));
        Ok(balances)
    }
}

#[derive(Debug, Deserialize)]
struct ProxyBalanceBody {
    balance: Option<String>,
    #[serde(default)]
    stale: bool,
}

/// Reads BTC through the same-origin proxy (`api::bitcoin`).
pub struct BitcoinBalanceFetcher {
    client: Client,
    proxy_url: String,
}

impl BitcoinBalanceFetcher {
    pub fn new(proxy_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(BITCOIN_PROXY_TIMEOUT_SECS))
            .user_agent(UPSTREAM_USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, proxy_url }
    }

    async fn proxy_balance(&self, address: &str) -> Result<String, WalletError> {
        let mut url = Url::parse(&self.proxy_url)
            .map_err(|e| WalletError::SourceUnavailable(format!("Invalid proxy URL: {}", e)))?;
        url.query_pairs_mut().append_pair("address", address);

        let response = self
            .client
            .get(url)
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::PRAGMA, "no-cache")
            .send()
            .await
            .map_err(|e| WalletError::SourceUnavailable(format!("Bitcoin proxy: {}", e)))?;

        if !response.status().is_success() {
            return Err(WalletError::SourceUnavailable(format!(
                "Bitcoin proxy returned {}",
                response.status()
            )));
        }

        let body: ProxyBalanceBody = response
            .json()
            .await
            .map_err(|e| WalletError::SourceUnavailable(format!("Bitcoin proxy: {}", e)))?;
        let balance = body.balance.ok_or_else(|| {
            WalletError::SourceUnavailable("Bitcoin proxy response has no balance".to_string())
        })?;
        let amount = Decimal::from_str(balance.trim()).map_err(|_| {
            WalletError::SourceUnavailable(format!("Invalid BTC balance: {}", balance))
        })?;
        if amount < Decimal::ZERO {
            return Err(WalletError::SourceUnavailable(format!(
                "Negative BTC balance: {}",
                balance
            )));
        }
        if body.stale {
            tracing::debug!("Bitcoin proxy served a stale balance");
        }
        Ok(format_decimal(
            amount.abs(),
            Ecosystem::Bitcoin.display_decimals(),
        ))
    }
}

#[async_trait]
impl BalanceFetcher for BitcoinBalanceFetcher {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Bitcoin
    }

    async fn fetch(
        &self,
        wallet: &WalletHandle,
        _tokens: &TokenMap,
    ) -> Result<Vec<Balance>, WalletError> {
        let balance = self.proxy_balance(&wallet.address).await?;
        Ok(vec![
            Balance::new(Ecosystem::Bitcoin.native_symbol(), balance, wallet),
            // Lightning balances are not queried.
            Balance::new("BTC (Lightning)", "0.0000", wallet),
        ])
    }
}
