// HTTP endpoints of the wallet backend
pub mod balances;
pub mod bitcoin;
pub mod health;
pub mod wallet;

use std::sync::Arc;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::Ecosystem;
use crate::providers::WalletProviders;
use crate::services::{
    BalanceService, BitcoinBalanceProxy, NotificationService, TokenMetadataCache, WalletController,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub providers: WalletProviders,
    pub controller: WalletController,
    pub balances: Arc<BalanceService>,
    pub tokens: Arc<TokenMetadataCache>,
    pub bitcoin_proxy: Arc<BitcoinBalanceProxy>,
    pub notices: NotificationService,
}

/// Parses the `{ecosystem}` path segment.
pub fn parse_ecosystem(raw: &str) -> Result<Ecosystem> {
    raw.parse::<Ecosystem>().map_err(AppError::BadRequest)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::integrations::BtcIndexer;
    use crate::providers::test_support::MockSet;
    use crate::services::balance_fetchers::{
        tests::{FixedEvmRpc, ScriptedSolanaRpc},
        BalanceFetcher, EvmBalanceFetcher, SolanaBalanceFetcher,
    };
    use crate::services::token_metadata::tests::{token, StaticTokenSource};
    use crate::services::wallet_observer::{tests::quiet_settings, WalletObserver};
    use crate::services::wallet_storage::WalletStorage;
    use std::collections::HashMap;

    /// State wired to in-memory wallets, RPCs and indexers.
    pub(crate) fn test_state(
        name: &str,
        mocks: &MockSet,
        indexers: Vec<Arc<dyn BtcIndexer>>,
    ) -> AppState {
        let dir = std::env::temp_dir().join(format!("wallet-api-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("connected_wallets.json");
        let _ = std::fs::remove_file(&path);

        let notices = NotificationService::new();
        let providers = mocks.providers();
        let observer = WalletObserver::new(providers.clone(), notices.clone(), quiet_settings());
        let controller = WalletController::new(
            providers.clone(),
            observer,
            WalletStorage::new(path),
            notices.clone(),
        );

        let tokens = Arc::new(TokenMetadataCache::new(Arc::new(
            StaticTokenSource::with_tokens(vec![token(1, "USDC")]),
        )));
        let fetchers: Vec<Arc<dyn BalanceFetcher>> = vec![
            Arc::new(EvmBalanceFetcher::new(Arc::new(FixedEvmRpc(Ok(
                2_000_000_000_000_000_000,
            ))))),
            Arc::new(SolanaBalanceFetcher::new(
                Arc::new(ScriptedSolanaRpc(HashMap::from([(
                    "https://solana.test".to_string(),
                    Ok(2_500_000_000),
                )]))),
                vec!["https://solana.test".to_string()],
            )),
        ];

        AppState {
            config: crate::config::test_config(),
            providers,
            controller,
            balances: Arc::new(BalanceService::new(tokens.clone(), fetchers)),
            tokens,
            bitcoin_proxy: Arc::new(BitcoinBalanceProxy::new(indexers)),
            notices,
        }
    }
}
