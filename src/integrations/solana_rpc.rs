use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::constants::UPSTREAM_USER_AGENT;
use crate::error::WalletError;
use crate::integrations::json_rpc::{JsonRpcRequest, JsonRpcResponse};

/// Native balance reads against a single Solana JSON-RPC endpoint.
#[async_trait]
pub trait SolanaRpc: Send + Sync {
    async fn get_balance_lamports(&self, endpoint: &str, address: &str)
        -> Result<u64, WalletError>;
}

#[derive(Debug, Clone)]
pub struct HttpSolanaRpc {
    client: Client,
}

impl Default for HttpSolanaRpc {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpSolanaRpc {
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(UPSTREAM_USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }
}

// Internal helper that parses or transforms values for `parse_balance_result`.
fn parse_balance_result(result: &serde_json::Value) -> Option<u64> {
    result
        .get("value")
        .and_then(|v| v.as_u64())
        .or_else(|| result.as_u64())
}

#[async_trait]
impl SolanaRpc for HttpSolanaRpc {
    async fn get_balance_lamports(
        &self,
        endpoint: &str,
        address: &str,
    ) -> Result<u64, WalletError> {
        let request = JsonRpcRequest::new(
            "getBalance",
            json!([address, { "commitment": "confirmed" }]),
        );
        let response = self
            .client
            .post(endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| WalletError::SourceUnavailable(format!("{}: {}", endpoint, e)))?;

        if !response.status().is_success() {
            return Err(WalletError::SourceUnavailable(format!(
                "{} returned {}",
                endpoint,
                response.status()
            )));
        }

        let envelope: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| WalletError::SourceUnavailable(format!("{}: {}", endpoint, e)))?;
        let result = envelope.into_result().map_err(|err| {
            if err.message.to_ascii_lowercase().contains("invalid param") {
                WalletError::InvalidAddress(address.to_string())
            } else {
                WalletError::SourceUnavailable(format!("{}: {}", endpoint, err.message))
            }
        })?;

        parse_balance_result(&result).ok_or_else(|| {
            WalletError::SourceUnavailable(format!("{}: malformed getBalance result", endpoint))
        })
    }
}
