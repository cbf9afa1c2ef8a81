use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::Config;
use crate::constants::{BTC_INDEXER_TIMEOUT_SECS, UPSTREAM_USER_AGENT};

/// Failure of a single indexer request. `RateLimited` is the only retryable one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("upstream rate limited")]
    RateLimited,

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("upstream transport error: {0}")]
    Transport(String),

    #[error("upstream payload malformed: {0}")]
    Malformed(String),
}

/// A public Bitcoin address indexer.
#[async_trait]
pub trait BtcIndexer: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_balance_sats(&self, address: &str) -> Result<u64, UpstreamError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexerKind {
    BlockCypher,
    BlockchainInfo,
    Mempool,
}

#[derive(Debug, Clone)]
pub struct HttpBtcIndexer {
    kind: IndexerKind,
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpBtcIndexer {
    /// Constructs a new instance via `new`.
    ///
    /// # Arguments
    /// * `kind` - Response shape and path layout of the indexer.
    /// * `base_url` - API root without trailing slash.
    /// * `api_key` - Optional token, only used by BlockCypher.
    ///
    /// # Returns
    /// * An indexer client with a bounded request timeout.
    ///
    /// # Notes
    /// * The API key is sent as a query parameter and never logged.
    pub fn new(kind: IndexerKind, base_url: String, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(BTC_INDEXER_TIMEOUT_SECS))
            .user_agent(UPSTREAM_USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            kind,
            base_url,
            api_key,
            client,
        }
    }

    /// Builds the default indexer chain: BlockCypher, blockchain.info, mempool.space.
    pub fn default_chain(config: &Config) -> Vec<std::sync::Arc<dyn BtcIndexer>> {
        vec![
            std::sync::Arc::new(Self::new(
                IndexerKind::BlockCypher,
                config.blockcypher_api_url.clone(),
                config.blockcypher_api_key.clone(),
            )),
            std::sync::Arc::new(Self::new(
                IndexerKind::BlockchainInfo,
                config.blockchain_info_api_url.clone(),
                None,
            )),
            std::sync::Arc::new(Self::new(
                IndexerKind::Mempool,
                config.mempool_api_url.clone(),
                None,
            )),
        ]
    }

    // Internal helper that builds the request URL for `address`.
    fn balance_url(&self, address: &str) -> Result<Url, UpstreamError> {
        let base = self.base_url.trim_end_matches('/');
        let raw = match self.kind {
            IndexerKind::BlockCypher => format!("{}/addrs/{}/balance", base, address),
            IndexerKind::BlockchainInfo => format!("{}/rawaddr/{}", base, address),
            IndexerKind::Mempool => format!("{}/api/address/{}", base, address),
        };
        let mut url = Url::parse(&raw).map_err(|e| UpstreamError::Transport(e.to_string()))?;
        match self.kind {
            IndexerKind::BlockCypher => {
                if let Some(key) = self.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
                    url.query_pairs_mut().append_pair("token", key.trim());
                }
            }
            IndexerKind::BlockchainInfo => {
                url.query_pairs_mut().append_pair("limit", "1");
            }
            IndexerKind::Mempool => {}
        }
        Ok(url)
    }
}

#[async_trait]
impl BtcIndexer for HttpBtcIndexer {
    fn name(&self) -> &str {
        match self.kind {
            IndexerKind::BlockCypher => "blockcypher",
            IndexerKind::BlockchainInfo => "blockchain.info",
            IndexerKind::Mempool => "mempool.space",
        }
    }

    async fn fetch_balance_sats(&self, address: &str) -> Result<u64, UpstreamError> {
        let url = self.balance_url(address)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(UpstreamError::RateLimited);
        }
        if !status.is_success() {
            return Err(UpstreamError::Status(status.as_u16()));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| UpstreamError::Malformed(e.to_string()))?;
        parse_balance_sats(self.kind, &payload)
    }
}

// Internal helper that supports `json_as_i128` operations.
fn json_as_i128(value: &Value) -> Option<i128> {
    value
        .as_i64()
        .map(i128::from)
        .or_else(|| value.as_u64().map(i128::from))
}

// Internal helper that reads `funded_txo_sum - spent_txo_sum` from a stats block.
fn stats_net(payload: &Value, block: &str) -> Option<i128> {
    let stats = payload.get(block)?;
    let funded = stats.get("funded_txo_sum").and_then(json_as_i128)?;
    let spent = stats.get("spent_txo_sum").and_then(json_as_i128)?;
    Some(funded - spent)
}

/// Extracts the balance in satoshis from an indexer payload.
pub fn parse_balance_sats(kind: IndexerKind, payload: &Value) -> Result<u64, UpstreamError> {
    let sats = match kind {
        IndexerKind::BlockCypher => payload.get("balance").and_then(json_as_i128),
        IndexerKind::BlockchainInfo => payload.get("final_balance").and_then(json_as_i128),
        IndexerKind::Mempool => stats_net(payload, "chain_stats").map(|confirmed| {
            confirmed.max(0) + stats_net(payload, "mempool_stats").unwrap_or(0)
        }),
    }
    .ok_or_else(|| UpstreamError::Malformed("balance field missing".to_string()))?;

    u64::try_from(sats.max(0)).map_err(|_| UpstreamError::Malformed("balance out of range".to_string()))
}
