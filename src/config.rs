use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::constants::{
    BITCOIN_POLL_INTERVAL_SECS, DEFAULT_BLOCKCHAIN_INFO_API_URL, DEFAULT_BLOCKCYPHER_API_URL,
    DEFAULT_ETHEREUM_RPC_URL, DEFAULT_MEMPOOL_API_URL, DEFAULT_SOLANA_RPC_URLS,
    DEFAULT_TOKEN_LIST_URL, DEFAULT_WALLET_STATE_PATH, SOLANA_RPC_TIMEOUT_SECS,
    WALLET_CONNECT_TIMEOUT_SECS, WALLET_POLL_INTERVAL_SECS,
};
use crate::utils::{env_non_empty, parse_rpc_url_list};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,
    pub environment: String,

    // Balance sources
    pub ethereum_rpc_url: String,
    pub solana_rpc_urls: Vec<String>,
    pub bitcoin_proxy_url: String,
    pub token_list_url: String,

    // Bitcoin indexers behind the proxy
    pub blockcypher_api_url: String,
    pub blockcypher_api_key: Option<String>,
    pub blockchain_info_api_url: String,
    pub mempool_api_url: String,

    // Wallet bridges
    pub evm_wallet_bridge_url: Option<String>,
    pub solana_wallet_bridge_url: Option<String>,
    pub bitcoin_wallet_bridge_url: Option<String>,
    pub dapp_url: Option<String>,

    // Wallet state
    pub wallet_state_path: String,
    pub wallet_connect_timeout_secs: u64,
    pub bitcoin_poll_interval_secs: u64,
    pub wallet_poll_interval_secs: u64,
    pub solana_rpc_timeout_secs: u64,

    // CORS
    pub cors_allowed_origins: String,
}

// Internal helper that parses a numeric variable with a default.
fn env_u64(name: &str, default: u64) -> anyhow::Result<u64> {
    match env_non_empty(name) {
        Some(raw) => Ok(raw.parse()?),
        None => Ok(default),
    }
}

// Internal helper that builds the ordered Solana endpoint list.
fn solana_rpc_urls() -> Vec<String> {
    let mut urls = Vec::new();
    if let Some(primary) = env_non_empty("SOLANA_RPC_URL") {
        urls.push(primary);
    }
    match env_non_empty("SOLANA_RPC_URLS") {
        Some(raw) => urls.extend(parse_rpc_url_list(&raw)),
        None => urls.extend(DEFAULT_SOLANA_RPC_URLS.iter().map(|url| url.to_string())),
    }
    let mut seen = std::collections::HashSet::new();
    urls.retain(|url| seen.insert(url.clone()));
    urls
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()?;

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),

            ethereum_rpc_url: env_non_empty("ETHEREUM_RPC_URL")
                .unwrap_or_else(|| DEFAULT_ETHEREUM_RPC_URL.to_string()),
            solana_rpc_urls: solana_rpc_urls(),
            bitcoin_proxy_url: env_non_empty("BITCOIN_PROXY_URL")
                .unwrap_or_else(|| format!("http://127.0.0.1:{}/api/bitcoin/balance", port)),
            token_list_url: env_non_empty("TOKEN_LIST_URL")
                .unwrap_or_else(|| DEFAULT_TOKEN_LIST_URL.to_string()),

            blockcypher_api_url: env_non_empty("BLOCKCYPHER_API_URL")
                .unwrap_or_else(|| DEFAULT_BLOCKCYPHER_API_URL.to_string()),
            blockcypher_api_key: env_non_empty("BLOCKCYPHER_API_KEY"),
            blockchain_info_api_url: env_non_empty("BLOCKCHAIN_INFO_API_URL")
                .unwrap_or_else(|| DEFAULT_BLOCKCHAIN_INFO_API_URL.to_string()),
            mempool_api_url: env_non_empty("MEMPOOL_API_URL")
                .unwrap_or_else(|| DEFAULT_MEMPOOL_API_URL.to_string()),

            evm_wallet_bridge_url: env_non_empty("EVM_WALLET_BRIDGE_URL"),
            solana_wallet_bridge_url: env_non_empty("SOLANA_WALLET_BRIDGE_URL"),
            bitcoin_wallet_bridge_url: env_non_empty("BITCOIN_WALLET_BRIDGE_URL"),
            dapp_url: env_non_empty("DAPP_URL"),

            wallet_state_path: env_non_empty("WALLET_STATE_PATH")
                .unwrap_or_else(|| DEFAULT_WALLET_STATE_PATH.to_string()),
            wallet_connect_timeout_secs: env_u64(
                "WALLET_CONNECT_TIMEOUT_SECS",
                WALLET_CONNECT_TIMEOUT_SECS,
            )?,
            bitcoin_poll_interval_secs: env_u64(
                "BITCOIN_POLL_INTERVAL_SECS",
                BITCOIN_POLL_INTERVAL_SECS,
            )?,
            wallet_poll_interval_secs: env_u64(
                "WALLET_POLL_INTERVAL_SECS",
                WALLET_POLL_INTERVAL_SECS,
            )?,
            solana_rpc_timeout_secs: env_u64("SOLANA_RPC_TIMEOUT_SECS", SOLANA_RPC_TIMEOUT_SECS)?,

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string()),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ethereum_rpc_url.trim().is_empty() {
            anyhow::bail!("ETHEREUM_RPC_URL is empty");
        }
        if self.solana_rpc_urls.is_empty() {
            anyhow::bail!("No Solana RPC endpoints configured");
        }
        if self.wallet_connect_timeout_secs == 0 || self.solana_rpc_timeout_secs == 0 {
            anyhow::bail!("Timeouts must be > 0");
        }
        if self.bitcoin_poll_interval_secs == 0 || self.wallet_poll_interval_secs == 0 {
            anyhow::bail!("Poll intervals must be > 0");
        }

        if self.evm_wallet_bridge_url.is_none() {
            tracing::warn!("EVM_WALLET_BRIDGE_URL not set; EVM wallet will report not installed");
        }
        if self.solana_wallet_bridge_url.is_none() {
            tracing::warn!("SOLANA_WALLET_BRIDGE_URL not set; Solana wallet will report not installed");
        }
        if self.bitcoin_wallet_bridge_url.is_none() {
            tracing::warn!("BITCOIN_WALLET_BRIDGE_URL not set; Bitcoin wallet will report not installed");
        }
        if self.blockcypher_api_key.is_none() {
            tracing::warn!("BLOCKCYPHER_API_KEY not set; BlockCypher requests are unauthenticated");
        }
        if self.solana_rpc_urls.iter().any(|url| url.contains("devnet")) {
            tracing::warn!("Solana endpoint list includes a devnet fallback");
        }
        if !self.is_development() && self.cors_allowed_origins.trim() == "*" {
            tracing::warn!("CORS is permissive outside development");
        }
        if self.cors_allowed_origins.trim().is_empty() {
            tracing::warn!("CORS_ALLOWED_ORIGINS is empty; requests may be blocked");
        }

        Ok(())
    }

    pub fn wallet_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.wallet_connect_timeout_secs)
    }

    pub fn solana_rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.solana_rpc_timeout_secs)
    }

    pub fn bitcoin_poll_interval(&self) -> Duration {
        Duration::from_secs(self.bitcoin_poll_interval_secs)
    }

    pub fn wallet_poll_interval(&self) -> Duration {
        Duration::from_secs(self.wallet_poll_interval_secs)
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 3000,
        environment: "test".to_string(),
        ethereum_rpc_url: DEFAULT_ETHEREUM_RPC_URL.to_string(),
        solana_rpc_urls: DEFAULT_SOLANA_RPC_URLS.iter().map(|s| s.to_string()).collect(),
        bitcoin_proxy_url: "http://127.0.0.1:3000/api/bitcoin/balance".to_string(),
        token_list_url: DEFAULT_TOKEN_LIST_URL.to_string(),
        blockcypher_api_url: DEFAULT_BLOCKCYPHER_API_URL.to_string(),
        blockcypher_api_key: None,
        blockchain_info_api_url: DEFAULT_BLOCKCHAIN_INFO_API_URL.to_string(),
        mempool_api_url: DEFAULT_MEMPOOL_API_URL.to_string(),
        evm_wallet_bridge_url: None,
        solana_wallet_bridge_url: None,
        bitcoin_wallet_bridge_url: None,
        dapp_url: None,
        wallet_state_path: DEFAULT_WALLET_STATE_PATH.to_string(),
        wallet_connect_timeout_secs: WALLET_CONNECT_TIMEOUT_SECS,
        bitcoin_poll_interval_secs: BITCOIN_POLL_INTERVAL_SECS,
        wallet_poll_interval_secs: WALLET_POLL_INTERVAL_SECS,
        solana_rpc_timeout_secs: SOLANA_RPC_TIMEOUT_SECS,
        cors_allowed_origins: "*".to_string(),
    }
}
