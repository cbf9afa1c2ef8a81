use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use super::{
    AccountSignal, AccountSignalHub, ConnectContext, WalletBridgeClient, WalletProvider,
};
use crate::error::WalletError;
use crate::models::{Ecosystem, WalletHandle};
use crate::utils::short_address;

/// Injected EIP-1193 provider (MetaMask and compatible wallets).
pub struct Eip1193Provider {
    bridge: WalletBridgeClient,
    signals: AccountSignalHub,
}

impl Eip1193Provider {
    pub fn new(bridge: WalletBridgeClient) -> Self {
        Self {
            bridge,
            signals: AccountSignalHub::default(),
        }
    }
}

// Internal helper that reads the first account of an `eth_accounts` style array.
fn first_account(result: &Value) -> Option<String> {
    result
        .as_array()
        .and_then(|accounts| accounts.first())
        .and_then(|account| account.as_str())
        .map(str::trim)
        .filter(|account| !account.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl WalletProvider for Eip1193Provider {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Evm
    }

    async fn is_installed(&self) -> bool {
        if !self.bridge.is_configured() {
            return false;
        }
        match self.bridge.call("eth_chainId", json!([])).await {
            Ok(_) => true,
            Err(WalletError::ProviderNotInstalled) | Err(WalletError::ConnectTimeout) => false,
            Err(err) => {
                tracing::debug!("eth_chainId probe failed but wallet responded: {}", err);
                true
            }
        }
    }

    async fn connect(&self, _ctx: &ConnectContext) -> Result<WalletHandle, WalletError> {
        let result = self.bridge.call("eth_requestAccounts", json!([])).await?;
        let address = first_account(&result)
            .ok_or_else(|| WalletError::Provider("No account found".to_string()))?;
        tracing::info!("EVM wallet connected: {}", short_address(&address));
        Ok(WalletHandle::new(Ecosystem::Evm, address))
    }

    async fn disconnect(&self) {
        // Connection state is owned by the app; the wallet keeps its permission.
        tracing::debug!("EVM wallet disconnected");
    }

    async fn check_still_connected(&self, _wallet: &WalletHandle) -> bool {
        self.is_installed().await
    }

    async fn current_account(&self) -> Result<Option<String>, WalletError> {
        let result = self.bridge.call("eth_accounts", json!([])).await?;
        Ok(first_account(&result))
    }

    fn account_signals(&self) -> Option<broadcast::Receiver<AccountSignal>> {
        Some(self.signals.subscribe())
    }

    fn publish_account_signal(&self, signal: AccountSignal) -> bool {
        self.signals.publish(signal);
        true
    }
}
