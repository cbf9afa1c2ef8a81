use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::constants::{TOKEN_LIST_TIMEOUT_SECS, UPSTREAM_USER_AGENT};
use crate::error::WalletError;
use crate::models::{TokenMap, TokenMetadata};
use crate::services::token_metadata::TokenListSource;

#[derive(Debug, Clone)]
pub struct LifiClient {
    base_url: String,
    client: Client,
}

impl LifiClient {
    /// Constructs a new instance via `new`.
    ///
    /// # Arguments
    /// * `base_url` - API root, e.g. `https://li.quest/v1`.
    ///
    /// # Returns
    /// * A client with a bounded request timeout.
    ///
    /// # Notes
    /// * Falls back to a default client if the builder fails.
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(TOKEN_LIST_TIMEOUT_SECS))
            .user_agent(UPSTREAM_USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { base_url, client }
    }

    /// Fetches data for `get_all_tokens`.
    ///
    /// # Arguments
    /// * None.
    ///
    /// # Returns
    /// * `Ok(TokenMap)` keyed by token id or `"{chainId}:{address}"`.
    /// * `Err(WalletError::MetadataUnavailable)` on transport, status or parse failure.
    ///
    /// # Notes
    /// * Entries that do not carry the required metadata fields are skipped.
    pub async fn get_all_tokens(&self) -> Result<TokenMap, WalletError> {
        let url = format!("{}/tokens", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| WalletError::MetadataUnavailable(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(WalletError::MetadataUnavailable(format!(
                "Failed to fetch tokens: {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| WalletError::MetadataUnavailable(format!("parse failed: {}", e)))?;

        parse_tokens_payload(&body)
    }
}

#[async_trait]
impl TokenListSource for LifiClient {
    async fn fetch_tokens(&self) -> Result<TokenMap, WalletError> {
        self.get_all_tokens().await
    }
}

// Internal helper that keys list entries by chain and address.
fn list_key(token: &TokenMetadata) -> String {
    format!("{}:{}", token.chain_id, token.address)
}

// Internal helper that supports `parse_token` operations.
fn parse_token(value: &Value) -> Option<TokenMetadata> {
    serde_json::from_value(value.clone()).ok()
}

/// Normalizes the `tokens` field. Accepted shapes are `id -> token`,
/// `chainId -> [token]` and a flat `[token]` array.
pub fn parse_tokens_payload(body: &Value) -> Result<TokenMap, WalletError> {
    let tokens = body
        .get("tokens")
        .ok_or_else(|| WalletError::MetadataUnavailable("missing tokens field".to_string()))?;

    let mut map = TokenMap::new();
    match tokens {
        Value::Object(entries) => {
            for (key, entry) in entries {
                match entry {
                    Value::Array(items) => {
                        for token in items.iter().filter_map(parse_token) {
                            map.insert(list_key(&token), token);
                        }
                    }
                    other => {
                        if let Some(token) = parse_token(other) {
                            map.insert(key.clone(), token);
                        }
                    }
                }
            }
        }
        Value::Array(items) => {
            for token in items.iter().filter_map(parse_token) {
                map.insert(list_key(&token), token);
            }
        }
        _ => {
            return Err(WalletError::MetadataUnavailable(
                "tokens field has an unexpected shape".to_string(),
            ))
        }
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token(chain_id: u64, symbol: &str, address: &str) -> Value {
        json!({
            "address": address,
            "chainId": chain_id,
            "symbol": symbol,
            "name": symbol,
            "decimals": 18
        })
    }

    #[test]
    fn parses_chain_grouped_payload() {
        // Memastikan format chainId -> [token] dari Li.Fi diparse
        let body = json!({
            "tokens": {
                "1": [token(1, "USDC", "0xa0b8"), token(1, "DAI", "0x6b17")],
                "501": [token(501, "BONK", "DezX")]
            }
        });
        let map = parse_tokens_payload(&body).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map["1:0xa0b8"].symbol, "USDC");
        assert_eq!(map["501:DezX"].chain_id, 501);
    }

    #[test]
    fn parses_id_keyed_payload_and_skips_invalid() {
        // Memastikan format id -> token diparse dan entri rusak dilewati
        let body = json!({
            "tokens": {
                "usdc": token(1, "USDC", "0xa0b8"),
                "broken": { "symbol": "???" }
            }
        });
        let map = parse_tokens_payload(&body).unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("usdc"));
    }

    #[test]
    fn parses_flat_array_payload() {
        // Memastikan format array datar diparse
        let body = json!({ "tokens": [token(1, "USDT", "0xdac1")] });
        let map = parse_tokens_payload(&body).unwrap();
        assert!(map.contains_key("1:0xdac1"));
    }

    #[test]
    fn missing_tokens_field_is_error() {
        // Memastikan payload tanpa field tokens dianggap gagal
        let err = parse_tokens_payload(&json!({ "chains": [] })).unwrap_err();
        assert!(matches!(err, WalletError::MetadataUnavailable(_)));
    }
}
