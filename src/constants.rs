/// Application constants

pub const API_VERSION: &str = "v1";

// Cache TTLs
pub const BALANCE_CACHE_TTL_SECS: u64 = 30;
pub const TOKEN_CACHE_TTL_SECS: u64 = 5 * 60;
pub const BITCOIN_PROXY_CACHE_TTL_SECS: u64 = 5 * 60;
// Expired entries older than this are pruned once a cache grows past its cap.
pub const CACHE_STALE_SECS: u64 = 60 * 60;
pub const CACHE_MAX_ENTRIES: usize = 50_000;

// Observer timing
pub const BITCOIN_POLL_INTERVAL_SECS: u64 = 10;
pub const WALLET_POLL_INTERVAL_SECS: u64 = 5;
pub const WALLET_CONNECT_TIMEOUT_SECS: u64 = 10;

// Outbound call timeouts
pub const EVM_RPC_TIMEOUT_SECS: u64 = 6;
pub const SOLANA_RPC_TIMEOUT_SECS: u64 = 3;
pub const BITCOIN_PROXY_TIMEOUT_SECS: u64 = 10;
pub const TOKEN_LIST_TIMEOUT_SECS: u64 = 10;
pub const BTC_INDEXER_TIMEOUT_SECS: u64 = 8;

// Bitcoin proxy rate limit (per address)
pub const BITCOIN_RATE_LIMIT_WINDOW_SECS: u64 = 60;
pub const BITCOIN_RATE_LIMIT_MAX_REQUESTS: u32 = 3;

// Upstream retry on 429
pub const UPSTREAM_RETRY_MAX_ATTEMPTS: u32 = 3;
pub const UPSTREAM_RETRY_BASE_MILLIS: u64 = 1_000;

// Metadata decoration
pub const MAX_PLACEHOLDER_TOKENS: usize = 5;
pub const EVM_MAINNET_CHAIN_ID: u64 = 1;
pub const SOLANA_CHAIN_IDS: [u64; 2] = [501, 1_151_111_081_099_710];

// Wallet event stream
pub const WS_HEARTBEAT_INTERVAL_SECS: u64 = 30;
pub const WS_CLIENT_TIMEOUT_SECS: u64 = 90;
pub const WALLET_EVENT_CHANNEL_CAPACITY: usize = 64;
pub const NOTICE_CHANNEL_CAPACITY: usize = 100;

// Defaults
pub const DEFAULT_TOKEN_LIST_URL: &str = "https://li.quest/v1";
pub const DEFAULT_ETHEREUM_RPC_URL: &str = "https://eth.llamarpc.com";
pub const DEFAULT_SOLANA_RPC_URLS: [&str; 5] = [
    "https://api.mainnet-beta.solana.com",
    "https://solana-mainnet.g.alchemy.com/v2/demo",
    "https://rpc.ankr.com/solana",
    "https://solana.public-rpc.com",
    "https://api.devnet.solana.com",
];
pub const DEFAULT_BLOCKCYPHER_API_URL: &str = "https://api.blockcypher.com/v1/btc/main";
pub const DEFAULT_BLOCKCHAIN_INFO_API_URL: &str = "https://blockchain.info";
pub const DEFAULT_MEMPOOL_API_URL: &str = "https://mempool.space";
pub const DEFAULT_WALLET_STATE_PATH: &str = "connected_wallets.json";
pub const UPSTREAM_USER_AGENT: &str = "Multi-Chain-Wallet/1.0";
pub const BITCOIN_CONNECT_MESSAGE: &str = "Connect to Multi-Chain Wallet";
