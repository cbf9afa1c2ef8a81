use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::error::WalletError;
use crate::integrations::json_rpc::{JsonRpcErrorObject, JsonRpcRequest, JsonRpcResponse};

/// EIP-1193 "User Rejected Request".
pub const RPC_USER_REJECTED: i64 = 4001;
/// EIP-1193 "Unauthorized": the account is locked or not authorized.
pub const RPC_UNAUTHORIZED: i64 = 4100;

/// JSON-RPC client for a browser wallet bridge.
///
/// A bridge forwards calls to the wallet injected in the user's page. No URL,
/// or a refused connection, means the wallet is not installed.
#[derive(Debug, Clone)]
pub struct WalletBridgeClient {
    url: Option<String>,
    client: Client,
    call_timeout: Duration,
}

impl WalletBridgeClient {
    pub fn new(url: Option<String>, call_timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            url: url.filter(|u| !u.trim().is_empty()),
            client,
            call_timeout,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    /// Calls `method` on the bridge and returns the JSON-RPC `result`.
    ///
    /// The whole round trip is bounded by the call timeout; an elapsed
    /// timeout is reported as `ConnectTimeout`.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        let url = self.url.as_deref().ok_or(WalletError::ProviderNotInstalled)?;
        let request = JsonRpcRequest::new(method, params);

        let send = async {
            let response = self
                .client
                .post(url)
                .json(&request)
                .send()
                .await
                .map_err(classify_transport_error)?;

            if !response.status().is_success() {
                return Err(WalletError::Provider(format!(
                    "wallet bridge returned {}",
                    response.status()
                )));
            }

            let envelope: JsonRpcResponse = response
                .json()
                .await
                .map_err(|e| WalletError::Provider(format!("invalid bridge response: {}", e)))?;
            envelope.into_result().map_err(|err| classify_rpc_error(&err))
        };

        match tokio::time::timeout(self.call_timeout, send).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!("Wallet bridge call {} timed out", method);
                Err(WalletError::ConnectTimeout)
            }
        }
    }
}

// Internal helper that maps reqwest failures to wallet errors.
fn classify_transport_error(err: reqwest::Error) -> WalletError {
    if err.is_connect() {
        WalletError::ProviderNotInstalled
    } else if err.is_timeout() {
        WalletError::ConnectTimeout
    } else {
        WalletError::Provider(err.without_url().to_string())
    }
}

/// Maps a wallet JSON-RPC error to the domain taxonomy.
pub fn classify_rpc_error(err: &JsonRpcErrorObject) -> WalletError {
    let message = err.message.to_ascii_lowercase();
    if err.code == RPC_USER_REJECTED
        || message.contains("rejected")
        || message.contains("cancelled")
        || message.contains("canceled")
    {
        WalletError::UserRejected
    } else if err.code == RPC_UNAUTHORIZED
        || message.contains("locked")
        || message.contains("not connected")
    {
        WalletError::NotConnected
    } else if message.contains("not installed") || message.contains("provider not found") {
        WalletError::ProviderNotInstalled
    } else {
        WalletError::Provider(err.message.clone())
    }
}
