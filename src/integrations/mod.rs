pub mod btc_indexers;
pub mod evm_rpc;
pub mod json_rpc;
pub mod lifi;
pub mod solana_rpc;

pub use btc_indexers::{BtcIndexer, HttpBtcIndexer, UpstreamError};
pub use evm_rpc::{EthersEvmRpc, EvmRpc};
pub use lifi::LifiClient;
pub use solana_rpc::{HttpSolanaRpc, SolanaRpc};
