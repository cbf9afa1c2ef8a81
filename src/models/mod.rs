// src/models/mod.rs
pub mod response;
pub mod wallet;

pub use response::ApiResponse;
pub use wallet::{
    Balance, ConnectedWalletSet, Ecosystem, TokenMap, TokenMetadata, WalletEvent, WalletHandle,
};
