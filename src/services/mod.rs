// All service modules
pub mod balance_fetchers;
pub mod balance_service;
pub mod bitcoin_proxy;
pub mod cache;
pub mod notification_service;
pub mod token_metadata;
pub mod wallet_controller;
pub mod wallet_observer;
pub mod wallet_storage;

// Re-export for convenience
pub use balance_service::BalanceService;
pub use bitcoin_proxy::BitcoinBalanceProxy;
pub use notification_service::{Notice, NotificationService};
pub use token_metadata::TokenMetadataCache;
pub use wallet_controller::{ConnectOutcome, WalletController};
pub use wallet_observer::{ObserverSettings, WalletObserver};
pub use wallet_storage::WalletStorage;
