use axum::http::HeaderValue;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod constants;
mod error;
mod integrations;
mod models;
mod providers;
mod services;
mod utils;
mod websocket;

use config::Config;
use constants::API_VERSION;
use integrations::{EthersEvmRpc, HttpBtcIndexer, HttpSolanaRpc, LifiClient};
use providers::WalletProviders;
use services::{
    BalanceService, BitcoinBalanceProxy, NotificationService, ObserverSettings,
    TokenMetadataCache, WalletController, WalletObserver, WalletStorage,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "multichain_wallet_backend=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    config.validate()?;

    tracing::info!("Starting Multi-Chain Wallet Backend");
    tracing::info!("Environment: {}", config.environment);
    tracing::info!("API Version: {}", API_VERSION);

    // Wallet side
    let notices = NotificationService::new();
    let providers = WalletProviders::from_config(&config);
    let observer = WalletObserver::new(
        providers.clone(),
        notices.clone(),
        ObserverSettings::from_config(&config),
    );
    let controller = WalletController::new(
        providers.clone(),
        observer.clone(),
        WalletStorage::new(&config.wallet_state_path),
        notices.clone(),
    );

    // Balance side
    let tokens = Arc::new(TokenMetadataCache::new(Arc::new(LifiClient::new(
        config.token_list_url.clone(),
    ))));
    let evm_rpc = Arc::new(EthersEvmRpc::new(&config.ethereum_rpc_url)?);
    let balances = Arc::new(BalanceService::from_config(
        &config,
        tokens.clone(),
        evm_rpc,
        Arc::new(HttpSolanaRpc::new()),
    ));
    let bitcoin_proxy = Arc::new(BitcoinBalanceProxy::new(HttpBtcIndexer::default_chain(
        &config,
    )));

    let restored = controller.restore().await;
    tracing::info!("Restored {} wallet(s)", restored.connected().len());

    let app_state = api::AppState {
        config: config.clone(),
        providers,
        controller: controller.clone(),
        balances,
        tokens,
        bitcoin_proxy,
        notices,
    };

    // Build router
    let app = build_router(app_state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    observer.stop();
    controller.flush().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

fn build_router(state: api::AppState) -> Router {
    // CORS configuration
    let cors = cors_from_config(&state.config);

    Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        // Wallets
        .route("/api/v1/wallets", get(api::wallet::list_wallets))
        .route(
            "/api/v1/wallets/{ecosystem}/installed",
            get(api::wallet::get_installed),
        )
        .route(
            "/api/v1/wallets/{ecosystem}/connect",
            post(api::wallet::connect_wallet),
        )
        .route(
            "/api/v1/wallets/{ecosystem}/disconnect",
            post(api::wallet::disconnect_wallet),
        )
        .route(
            "/api/v1/wallets/{ecosystem}/account-signal",
            post(api::wallet::push_account_signal),
        )
        // Balances & token metadata
        .route("/api/v1/balances", get(api::balances::get_balances))
        .route("/api/v1/tokens", get(api::balances::get_tokens))
        // Bitcoin balance proxy
        .route("/api/bitcoin/balance", get(api::bitcoin::get_balance))
        // WebSocket endpoints
        .route("/ws/wallet-events", get(websocket::wallet_events::handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_from_config(config: &Config) -> CorsLayer {
    let raw = config.cors_allowed_origins.trim();
    if raw.is_empty() || raw == "*" {
        return CorsLayer::very_permissive();
    }

    let allowed: Vec<HeaderValue> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<HeaderValue>().ok())
        .collect();

    if allowed.is_empty() {
        tracing::warn!("No valid CORS origins parsed; falling back to permissive");
        return CorsLayer::very_permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}
