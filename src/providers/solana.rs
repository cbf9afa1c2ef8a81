use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use url::Url;

use super::{
    AccountSignal, AccountSignalHub, ConnectContext, WalletBridgeClient, WalletProvider,
};
use crate::error::WalletError;
use crate::models::{Ecosystem, WalletHandle};
use crate::utils::short_address;

const PHANTOM_BROWSE_URL: &str = "https://phantom.app/ul/browse/";

/// Phantom wallet adapter.
pub struct PhantomProvider {
    bridge: WalletBridgeClient,
    dapp_url: Option<String>,
    signals: AccountSignalHub,
}

impl PhantomProvider {
    pub fn new(bridge: WalletBridgeClient, dapp_url: Option<String>) -> Self {
        Self {
            bridge,
            dapp_url,
            signals: AccountSignalHub::default(),
        }
    }

    async fn request_connect(&self, only_if_trusted: bool) -> Result<Option<String>, WalletError> {
        let result = self
            .bridge
            .call("connect", json!({ "onlyIfTrusted": only_if_trusted }))
            .await?;
        Ok(public_key(&result))
    }
}

// Internal helper that reads `publicKey` from a Phantom response.
fn public_key(result: &Value) -> Option<String> {
    result
        .get("publicKey")
        .and_then(|key| key.as_str())
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
}

/// Builds the Phantom in-app browser link that reopens `dapp_url` inside the
/// mobile wallet.
pub fn phantom_browse_link(dapp_url: &str) -> Result<String, WalletError> {
    let parsed = Url::parse(dapp_url)
        .map_err(|e| WalletError::Provider(format!("Invalid dapp URL: {}", e)))?;
    let origin = parsed.origin().ascii_serialization();
    let target: String = url::form_urlencoded::byte_serialize(parsed.as_str().as_bytes()).collect();
    let reference: String = url::form_urlencoded::byte_serialize(origin.as_bytes()).collect();
    Ok(format!("{}{}?ref={}", PHANTOM_BROWSE_URL, target, reference))
}

// Internal helper that rewrites generic failures into the Phantom message.
fn map_connect_error(err: WalletError) -> WalletError {
    match err {
        WalletError::Provider(message) => {
            tracing::debug!("Phantom connect failed: {}", message);
            WalletError::Provider("Failed to connect to Phantom wallet".to_string())
        }
        other => other,
    }
}

#[async_trait]
impl WalletProvider for PhantomProvider {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Solana
    }

    async fn is_installed(&self) -> bool {
        if !self.bridge.is_configured() {
            return false;
        }
        match self.bridge.call("getAccount", json!({})).await {
            Ok(_) => true,
            Err(WalletError::ProviderNotInstalled) | Err(WalletError::ConnectTimeout) => false,
            Err(_) => true,
        }
    }

    async fn connect(&self, ctx: &ConnectContext) -> Result<WalletHandle, WalletError> {
        if ctx.is_mobile() {
            let dapp_url = ctx
                .dapp_url
                .as_deref()
                .or(self.dapp_url.as_deref())
                .ok_or_else(|| {
                    WalletError::Provider("DAPP_URL is required for the mobile redirect".to_string())
                })?;
            let url = phantom_browse_link(dapp_url)?;
            tracing::info!("Mobile user agent, redirecting to Phantom browser");
            return Err(WalletError::Redirecting { url });
        }

        let address = self
            .request_connect(false)
            .await
            .map_err(map_connect_error)?
            .ok_or_else(|| WalletError::Provider("Failed to connect Phantom wallet".to_string()))?;
        tracing::info!("Solana wallet connected: {}", short_address(&address));
        Ok(WalletHandle::new(Ecosystem::Solana, address))
    }

    async fn disconnect(&self) {
        match self.bridge.call("disconnect", json!({})).await {
            Ok(_) => tracing::debug!("Solana wallet disconnected"),
            Err(err) => tracing::warn!("Error disconnecting Solana wallet: {}", err),
        }
    }

    async fn check_still_connected(&self, wallet: &WalletHandle) -> bool {
        match self.reconnect_silently().await {
            Ok(Some(key)) => key == wallet.address,
            Ok(None) => false,
            Err(err) => {
                tracing::debug!("Solana silent check failed: {}", err);
                false
            }
        }
    }

    async fn current_account(&self) -> Result<Option<String>, WalletError> {
        let result = self.bridge.call("getAccount", json!({})).await?;
        let connected = result
            .get("isConnected")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        if !connected {
            return Ok(None);
        }
        Ok(public_key(&result))
    }

    async fn reconnect_silently(&self) -> Result<Option<String>, WalletError> {
        self.request_connect(true).await
    }

    fn account_signals(&self) -> Option<broadcast::Receiver<AccountSignal>> {
        Some(self.signals.subscribe())
    }

    fn publish_account_signal(&self, signal: AccountSignal) -> bool {
        self.signals.publish(signal);
        true
    }
}
