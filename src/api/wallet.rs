use axum::{
    extract::{Path, State},
    http::{header::USER_AGENT, HeaderMap},
    Json,
};
use serde::Serialize;

use super::{parse_ecosystem, AppState};
use crate::{
    error::{AppError, Result},
    models::{ApiResponse, ConnectedWalletSet, Ecosystem},
    providers::{AccountSignal, ConnectContext},
    services::ConnectOutcome,
};

#[derive(Debug, Serialize)]
pub struct WalletsResponse {
    pub wallets: ConnectedWalletSet,
    pub connecting: Vec<Ecosystem>,
}

#[derive(Debug, Serialize)]
pub struct InstalledResponse {
    pub ecosystem: Ecosystem,
    pub installed: bool,
}

#[derive(Debug, Serialize)]
pub struct AccountSignalResponse {
    pub ecosystem: Ecosystem,
    pub accepted: bool,
}

// Internal helper that builds the wallet overview.
fn wallets_response(state: &AppState) -> WalletsResponse {
    WalletsResponse {
        wallets: state.controller.snapshot(),
        connecting: Ecosystem::ALL
            .into_iter()
            .filter(|ecosystem| state.controller.is_connecting(*ecosystem))
            .collect(),
    }
}

/// GET /api/v1/wallets
pub async fn list_wallets(State(state): State<AppState>) -> Json<ApiResponse<WalletsResponse>> {
    Json(ApiResponse::success(wallets_response(&state)))
}

/// GET /api/v1/wallets/{ecosystem}/installed
pub async fn get_installed(
    State(state): State<AppState>,
    Path(ecosystem): Path<String>,
) -> Result<Json<ApiResponse<InstalledResponse>>> {
    let ecosystem = parse_ecosystem(&ecosystem)?;
    let installed = state.providers.get(ecosystem).is_installed().await;
    Ok(Json(ApiResponse::success(InstalledResponse {
        ecosystem,
        installed,
    })))
}

/// POST /api/v1/wallets/{ecosystem}/connect
pub async fn connect_wallet(
    State(state): State<AppState>,
    Path(ecosystem): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<ConnectOutcome>>> {
    let ecosystem = parse_ecosystem(&ecosystem)?;
    let ctx = ConnectContext {
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        dapp_url: state.config.dapp_url.clone(),
    };

    let outcome = state.controller.connect(ecosystem, &ctx).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// POST /api/v1/wallets/{ecosystem}/disconnect
pub async fn disconnect_wallet(
    State(state): State<AppState>,
    Path(ecosystem): Path<String>,
) -> Result<Json<ApiResponse<WalletsResponse>>> {
    let ecosystem = parse_ecosystem(&ecosystem)?;
    state.controller.disconnect(ecosystem).await;
    Ok(Json(ApiResponse::success(wallets_response(&state))))
}

/// POST /api/v1/wallets/{ecosystem}/account-signal
///
/// Called by the wallet bridge when the wallet reports an account change.
pub async fn push_account_signal(
    State(state): State<AppState>,
    Path(ecosystem): Path<String>,
    Json(signal): Json<AccountSignal>,
) -> Result<Json<ApiResponse<AccountSignalResponse>>> {
    let ecosystem = parse_ecosystem(&ecosystem)?;
    if !state.providers.get(ecosystem).publish_account_signal(signal) {
        return Err(AppError::BadRequest(format!(
            "{} wallet does not emit account events",
            ecosystem.display_name()
        )));
    }
    Ok(Json(ApiResponse::success(AccountSignalResponse {
        ecosystem,
        accepted: true,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::test_state;
    use crate::providers::test_support::MockSet;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn connect_then_list_shows_wallet() {
        // Memastikan wallet yang terhubung muncul di daftar wallet
        let mocks = MockSet::new();
        mocks.evm.set_connect_result(Ok("0xAbC0000000000000000000000000000000001234"));
        let state = test_state("api-connect", &mocks, vec![]);

        let Json(response) = connect_wallet(
            State(state.clone()),
            Path("evm".to_string()),
            HeaderMap::new(),
        )
        .await
        .unwrap();
        assert!(response.success);
        assert!(matches!(response.data, ConnectOutcome::Connected { .. }));

        let Json(list) = list_wallets(State(state)).await;
        assert!(list.data.wallets.evm.is_some());
        assert!(list.data.connecting.is_empty());
    }

    #[tokio::test]
    async fn mobile_solana_connect_returns_redirect() {
        // Memastikan koneksi Solana dari mobile mengembalikan redirect
        let mocks = MockSet::new();
        mocks.solana.set_connect_result(Err(crate::error::WalletError::Redirecting {
            url: "https://phantom.app/ul/browse/x?ref=y".to_string(),
        }));
        let state = test_state("api-redirect", &mocks, vec![]);
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)"),
        );

        let Json(response) = connect_wallet(State(state), Path("solana".to_string()), headers)
            .await
            .unwrap();
        assert!(matches!(response.data, ConnectOutcome::Redirecting { .. }));
    }

    #[tokio::test]
    async fn unknown_ecosystem_is_bad_request() {
        // Memastikan ekosistem tidak dikenal ditolak
        let mocks = MockSet::new();
        let state = test_state("api-unknown", &mocks, vec![]);
        let err = get_installed(State(state), Path("dogecoin".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn account_signal_needs_push_channel() {
        // Memastikan sinyal akun ditolak untuk wallet tanpa event
        let mocks = MockSet::new();
        let state = test_state("api-signal", &mocks, vec![]);
        let err = push_account_signal(
            State(state),
            Path("bitcoin".to_string()),
            Json(AccountSignal { account: None }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn disconnect_returns_cleared_set() {
        // Memastikan disconnect mengembalikan set wallet yang sudah dikosongkan
        let mocks = MockSet::new();
        mocks.bitcoin.set_connect_result(Ok("bc1qpay"));
        let state = test_state("api-disconnect", &mocks, vec![]);
        state
            .controller
            .connect(Ecosystem::Bitcoin, &ConnectContext::default())
            .await
            .unwrap();

        let Json(response) = disconnect_wallet(State(state), Path("bitcoin".to_string()))
            .await
            .unwrap();
        assert!(response.data.wallets.is_empty());
    }
}
