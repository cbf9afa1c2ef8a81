use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::balance_fetchers::{
    BalanceFetcher, BitcoinBalanceFetcher, EvmBalanceFetcher, SolanaBalanceFetcher,
};
use super::cache::TtlCache;
use super::token_metadata::TokenMetadataCache;
use crate::config::Config;
use crate::constants::BALANCE_CACHE_TTL_SECS;
use crate::error::WalletError;
use crate::integrations::{EvmRpc, SolanaRpc};
use crate::models::{Balance, ConnectedWalletSet, Ecosystem, TokenMap, WalletHandle};
use crate::utils::short_address;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BalanceCacheKey {
    pub ecosystem: Ecosystem,
    pub address: String,
}

impl From<&WalletHandle> for BalanceCacheKey {
    fn from(wallet: &WalletHandle) -> Self {
        Self {
            ecosystem: wallet.ecosystem,
            address: wallet.address.clone(),
        }
    }
}

/// Merges per-chain balances for every connected wallet.
pub struct BalanceService {
    tokens: Arc<TokenMetadataCache>,
    fetchers: HashMap<Ecosystem, Arc<dyn BalanceFetcher>>,
    cache: TtlCache<BalanceCacheKey, Vec<Balance>>,
}

impl BalanceService {
    pub fn new(tokens: Arc<TokenMetadataCache>, fetchers: Vec<Arc<dyn BalanceFetcher>>) -> Self {
        Self::with_ttl(tokens, fetchers, Duration::from_secs(BALANCE_CACHE_TTL_SECS))
    }

    pub fn with_ttl(
        tokens: Arc<TokenMetadataCache>,
        fetchers: Vec<Arc<dyn BalanceFetcher>>,
        ttl: Duration,
    ) -> Self {
        let fetchers = fetchers
            .into_iter()
            .map(|fetcher| (fetcher.ecosystem(), fetcher))
            .collect();
        Self {
            tokens,
            fetchers,
            cache: TtlCache::new(ttl),
        }
    }

    /// Wires one fetcher per ecosystem from the runtime config.
    pub fn from_config(
        config: &Config,
        tokens: Arc<TokenMetadataCache>,
        evm_rpc: Arc<dyn EvmRpc>,
        solana_rpc: Arc<dyn SolanaRpc>,
    ) -> Self {
        let fetchers: Vec<Arc<dyn BalanceFetcher>> = vec![
            Arc::new(EvmBalanceFetcher::new(evm_rpc)),
            Arc::new(SolanaBalanceFetcher::with_timeout(
                solana_rpc,
                config.solana_rpc_urls.clone(),
                config.solana_rpc_timeout(),
            )),
            Arc::new(BitcoinBalanceFetcher::new(config.bitcoin_proxy_url.clone())),
        ];
        Self::new(tokens, fetchers)
    }

    /// Balances for all connected wallets in EVM, Solana, Bitcoin order.
    /// Never fails: a chain that errors contributes one zero native row.
    pub async fn aggregate(&self, wallets: &ConnectedWalletSet) -> Vec<Balance> {
        let connected = wallets.connected();
        if connected.is_empty() {
            return Vec::new();
        }

        let tokens = self.tokens.get_tokens().await;
        let results = join_all(
            connected
                .iter()
                .map(|wallet| self.wallet_balances(wallet, &tokens)),
        )
        .await;

        results.into_iter().flatten().collect()
    }

    async fn wallet_balances(&self, wallet: &WalletHandle, tokens: &TokenMap) -> Vec<Balance> {
        let fetched = match self.fetchers.get(&wallet.ecosystem) {
            Some(fetcher) => {
                self.cache
                    .get_or_fetch(BalanceCacheKey::from(wallet), || fetcher.fetch(wallet, tokens))
                    .await
            }
            None => Err(WalletError::SourceUnavailable(format!(
                "no balance fetcher for {}",
                wallet.ecosystem
            ))),
        };

        match fetched {
            Ok(balances) => balances,
            Err(err) => {
                tracing::error!(
                    "Error fetching {} balance for {}: {}",
                    wallet.ecosystem.label(),
                    short_address(&wallet.address),
                    err
                );
                vec![Balance::zero_native(wallet)]
            }
        }
    }

    pub async fn invalidate(&self, wallet: &WalletHandle) {
        self.cache.invalidate(&BalanceCacheKey::from(wallet)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::balance_fetchers::tests::{FixedEvmRpc, ScriptedSolanaRpc};
    use crate::services::token_metadata::tests::{token, StaticTokenSource};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        ecosystem: Ecosystem,
        result: Result<Vec<(&'static str, &'static str)>, WalletError>,
        calls: AtomicUsize,
    }

    impl CountingFetcher {
        fn new(
            ecosystem: Ecosystem,
            result: Result<Vec<(&'static str, &'static str)>, WalletError>,
        ) -> Arc<Self> {
            Arc::new(Self {
                ecosystem,
                result,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl BalanceFetcher for CountingFetcher {
        fn ecosystem(&self) -> Ecosystem {
            self.ecosystem
        }

        async fn fetch(
            &self,
            wallet: &WalletHandle,
            _tokens: &TokenMap,
        ) -> Result<Vec<Balance>, WalletError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone().map(|rows| {
                rows.into_iter()
                    .map(|(token, amount)| Balance::new(token, amount, wallet))
                    .collect()
            })
        }
    }

    fn token_cache(tokens: Vec<crate::models::TokenMetadata>) -> Arc<TokenMetadataCache> {
        Arc::new(TokenMetadataCache::new(Arc::new(
            StaticTokenSource::with_tokens(tokens),
        )))
    }

    fn wallets(evm: Option<&str>, solana: Option<&str>, bitcoin: Option<&str>) -> ConnectedWalletSet {
        let mut set = ConnectedWalletSet::default();
        for (ecosystem, address) in [
            (Ecosystem::Evm, evm),
            (Ecosystem::Solana, solana),
            (Ecosystem::Bitcoin, bitcoin),
        ] {
            if let Some(address) = address {
                set.set(WalletHandle::new(ecosystem, address));
            }
        }
        set
    }

    #[tokio::test]
    async fn no_wallets_means_no_rows() {
        // Memastikan tanpa wallet terhubung hasilnya kosong
        let service = BalanceService::new(token_cache(vec![]), vec![]);
        assert!(service.aggregate(&ConnectedWalletSet::default()).await.is_empty());
    }

    #[tokio::test]
    async fn evm_and_solana_rows_are_merged_in_order() {
        // Memastikan saldo EVM dan Solana digabung berurutan
        let fetchers: Vec<Arc<dyn BalanceFetcher>> = vec![
            Arc::new(SolanaBalanceFetcher::new(
                Arc::new(ScriptedSolanaRpc(HashMap::from([(
                    "https://a".to_string(),
                    Ok(2_500_000_000),
                )]))),
                vec!["https://a".to_string()],
            )),
            Arc::new(EvmBalanceFetcher::new(Arc::new(FixedEvmRpc(Ok(
                500_000_000_000_000_000,
            ))))),
        ];
        let service = BalanceService::new(
            token_cache(vec![token(1, "USDC"), token(501, "BONK")]),
            fetchers,
        );
        let set = wallets(Some("0xabc"), Some("9xQe"), None);

        let rows = service.aggregate(&set).await;
        let summary: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| (r.token.as_str(), r.amount.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("ETH", "0.5000"),
                ("USDC", "0.0000"),
                ("SOL", "2.5000"),
                ("BONK", "0.0000")
            ]
        );
    }

    #[tokio::test]
    async fn failing_chain_yields_zero_row_without_affecting_others() {
        // Memastikan kegagalan satu chain tidak memengaruhi chain lain
        let evm = CountingFetcher::new(Ecosystem::Evm, Ok(vec![("ETH", "1.0000")]));
        let btc = CountingFetcher::new(
            Ecosystem::Bitcoin,
            Err(WalletError::SourceUnavailable("proxy down".to_string())),
        );
        let fetchers: Vec<Arc<dyn BalanceFetcher>> = vec![evm.clone(), btc.clone()];
        let service = BalanceService::new(token_cache(vec![]), fetchers);
        let set = wallets(Some("0xabc"), None, Some("bc1q"));

        let rows = service.aggregate(&set).await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].amount, "1.0000");
        assert_eq!(rows[1], Balance::new("BTC", "0.00000000", set.bitcoin.as_ref().unwrap()));

        // Failures are retried, successes are served from cache.
        service.aggregate(&set).await;
        assert_eq!(evm.calls.load(Ordering::SeqCst), 1);
        assert_eq!(btc.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_fetcher_yields_zero_row() {
        // Memastikan chain tanpa fetcher menghasilkan baris nol
        let service = BalanceService::new(token_cache(vec![]), vec![]);
        let set = wallets(None, Some("9xQe"), None);
        let rows = service.aggregate(&set).await;
        assert_eq!(rows, vec![Balance::new("SOL", "0.0000", set.solana.as_ref().unwrap())]);
    }

    #[tokio::test(start_paused = true)]
    async fn cached_balances_expire_after_ttl() {
        // Memastikan cache saldo kedaluwarsa setelah 30 detik
        let evm = CountingFetcher::new(Ecosystem::Evm, Ok(vec![("ETH", "1.0000")]));
        let fetchers: Vec<Arc<dyn BalanceFetcher>> = vec![evm.clone()];
        let service = BalanceService::new(token_cache(vec![]), fetchers);
        let set = wallets(Some("0xabc"), None, None);

        service.aggregate(&set).await;
        tokio::time::advance(Duration::from_secs(29)).await;
        service.aggregate(&set).await;
        assert_eq!(evm.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        service.aggregate(&set).await;
        assert_eq!(evm.calls.load(Ordering::SeqCst), 2);

        service.invalidate(set.evm.as_ref().unwrap()).await;
        service.aggregate(&set).await;
        assert_eq!(evm.calls.load(Ordering::SeqCst), 3);
    }
}
