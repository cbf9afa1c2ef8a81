// Provider adapters: one capability interface over the EVM, Solana and
// Bitcoin browser wallets.
pub mod bitcoin;
pub mod bridge;
pub mod evm;
pub mod solana;

pub use bitcoin::SatsConnectProvider;
pub use bridge::WalletBridgeClient;
pub use evm::Eip1193Provider;
pub use solana::PhantomProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::constants::WALLET_EVENT_CHANNEL_CAPACITY;
use crate::error::WalletError;
use crate::models::{Ecosystem, WalletHandle};
use crate::utils::is_mobile_user_agent;

/// Account change pushed by a wallet. `None` means the wallet disconnected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSignal {
    pub account: Option<String>,
}

/// Request context for a connect attempt.
#[derive(Debug, Clone, Default)]
pub struct ConnectContext {
    pub user_agent: Option<String>,
    pub dapp_url: Option<String>,
}

impl ConnectContext {
    pub fn is_mobile(&self) -> bool {
        self.user_agent
            .as_deref()
            .map(is_mobile_user_agent)
            .unwrap_or(false)
    }
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    fn ecosystem(&self) -> Ecosystem;

    async fn is_installed(&self) -> bool;

    /// Prompts the wallet for an account.
    async fn connect(&self, ctx: &ConnectContext) -> Result<WalletHandle, WalletError>;

    /// Best effort; failures are logged, never returned.
    async fn disconnect(&self);

    /// Checks without prompting that `wallet` is still the active account.
    async fn check_still_connected(&self, wallet: &WalletHandle) -> bool;

    /// Silent query of the active account.
    async fn current_account(&self) -> Result<Option<String>, WalletError>;

    /// Reconnects a previously trusted site without a prompt.
    async fn reconnect_silently(&self) -> Result<Option<String>, WalletError> {
        self.current_account().await
    }

    /// Push channel for account changes, when the wallet has one.
    fn account_signals(&self) -> Option<broadcast::Receiver<AccountSignal>> {
        None
    }

    /// Feeds an account change reported by the bridge. Returns `false` when
    /// the wallet has no push channel.
    fn publish_account_signal(&self, _signal: AccountSignal) -> bool {
        false
    }
}

/// Broadcast hub behind `account_signals` for wallets that emit events.
#[derive(Debug, Clone)]
pub struct AccountSignalHub {
    tx: broadcast::Sender<AccountSignal>,
}

impl Default for AccountSignalHub {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(WALLET_EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }
}

impl AccountSignalHub {
    pub fn subscribe(&self) -> broadcast::Receiver<AccountSignal> {
        self.tx.subscribe()
    }

    pub fn publish(&self, signal: AccountSignal) {
        // No receivers is fine: nobody is watching this wallet yet.
        let _ = self.tx.send(signal);
    }
}

/// One adapter per ecosystem.
#[derive(Clone)]
pub struct WalletProviders {
    evm: Arc<dyn WalletProvider>,
    solana: Arc<dyn WalletProvider>,
    bitcoin: Arc<dyn WalletProvider>,
}

impl WalletProviders {
    pub fn new(
        evm: Arc<dyn WalletProvider>,
        solana: Arc<dyn WalletProvider>,
        bitcoin: Arc<dyn WalletProvider>,
    ) -> Self {
        for (slot, provider) in [
            (Ecosystem::Evm, &evm),
            (Ecosystem::Solana, &solana),
            (Ecosystem::Bitcoin, &bitcoin),
        ] {
            debug_assert_eq!(provider.ecosystem(), slot, "adapter registered in the wrong slot");
        }
        Self {
            evm,
            solana,
            bitcoin,
        }
    }

    /// Builds the bridge-backed adapters from configuration.
    pub fn from_config(config: &Config) -> Self {
        let timeout = config.wallet_connect_timeout();
        Self::new(
            Arc::new(Eip1193Provider::new(WalletBridgeClient::new(
                config.evm_wallet_bridge_url.clone(),
                timeout,
            ))),
            Arc::new(PhantomProvider::new(
                WalletBridgeClient::new(config.solana_wallet_bridge_url.clone(), timeout),
                config.dapp_url.clone(),
            )),
            Arc::new(SatsConnectProvider::new(WalletBridgeClient::new(
                config.bitcoin_wallet_bridge_url.clone(),
                timeout,
            ))),
        )
    }

    pub fn get(&self, ecosystem: Ecosystem) -> Arc<dyn WalletProvider> {
        match ecosystem {
            Ecosystem::Evm => self.evm.clone(),
            Ecosystem::Solana => self.solana.clone(),
            Ecosystem::Bitcoin => self.bitcoin.clone(),
        }
    }
}
