use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ConnectContext, WalletBridgeClient, WalletProvider};
use crate::constants::BITCOIN_CONNECT_MESSAGE;
use crate::error::WalletError;
use crate::models::{Ecosystem, WalletHandle};
use crate::utils::short_address;

/// sats-connect compatible wallet (Xverse and others). Has no push events,
/// so account changes are observed by polling.
pub struct SatsConnectProvider {
    bridge: WalletBridgeClient,
}

impl SatsConnectProvider {
    pub fn new(bridge: WalletBridgeClient) -> Self {
        Self { bridge }
    }
}

/// Picks the payment-purpose address out of a sats-connect account result.
fn payment_address(result: &Value) -> Option<String> {
    result
        .get("addresses")
        .and_then(|addresses| addresses.as_array())?
        .iter()
        .find(|item| item.get("purpose").and_then(|p| p.as_str()) == Some("payment"))
        .and_then(|item| item.get("address"))
        .and_then(|address| address.as_str())
        .filter(|address| !address.trim().is_empty())
        .map(str::to_string)
}

// Internal helper that fills in a message for anonymous wallet failures.
fn map_connect_error(err: WalletError) -> WalletError {
    match err {
        WalletError::Provider(message) if message.trim().is_empty() => {
            WalletError::Provider("Failed to connect Bitcoin wallet".to_string())
        }
        other => other,
    }
}

#[async_trait]
impl WalletProvider for SatsConnectProvider {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Bitcoin
    }

    async fn is_installed(&self) -> bool {
        if !self.bridge.is_configured() {
            return false;
        }
        // A locked or unauthorized wallet still answers, so it is installed.
        match self.bridge.call("wallet_getAccount", Value::Null).await {
            Ok(_) => true,
            Err(WalletError::UserRejected) | Err(WalletError::NotConnected) => true,
            Err(err) => {
                tracing::debug!("Bitcoin wallet probe failed: {}", err);
                false
            }
        }
    }

    async fn connect(&self, _ctx: &ConnectContext) -> Result<WalletHandle, WalletError> {
        match self.current_account().await {
            Ok(Some(address)) => {
                tracing::info!("Bitcoin wallet already connected, using existing connection");
                return Ok(WalletHandle::new(Ecosystem::Bitcoin, address));
            }
            Ok(None) => {}
            Err(err) => {
                tracing::debug!("No existing Bitcoin connection ({}), prompting user", err);
            }
        }

        let result = self
            .bridge
            .call(
                "wallet_connect",
                json!({
                    "addresses": ["payment"],
                    "message": BITCOIN_CONNECT_MESSAGE,
                }),
            )
            .await
            .map_err(map_connect_error)?;
        let address = payment_address(&result)
            .ok_or_else(|| WalletError::Provider("No Bitcoin payment address found".to_string()))?;
        tracing::info!("Bitcoin wallet connected: {}", short_address(&address));
        Ok(WalletHandle::new(Ecosystem::Bitcoin, address))
    }

    async fn disconnect(&self) {
        match self.bridge.call("wallet_disconnect", Value::Null).await {
            Ok(_) => tracing::debug!("Bitcoin wallet disconnected"),
            Err(err) => tracing::warn!("Error disconnecting Bitcoin wallet: {}", err),
        }
    }

    async fn check_still_connected(&self, wallet: &WalletHandle) -> bool {
        match self.current_account().await {
            Ok(Some(address)) => address == wallet.address,
            Ok(None) => false,
            Err(err) => {
                tracing::debug!("Error checking Bitcoin wallet connection: {}", err);
                false
            }
        }
    }

    async fn current_account(&self) -> Result<Option<String>, WalletError> {
        let result = self.bridge.call("wallet_getAccount", Value::Null).await?;
        Ok(payment_address(&result))
    }
}
