use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::error::WalletError;
use crate::utils::short_address;

const ZERO_BALANCE: &str = "0.00000000";

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub address: Option<String>,
}

// Internal helper that renders the proxy error body.
fn failure(status: StatusCode) -> Response {
    (
        status,
        Json(json!({
            "error": "Failed to fetch Bitcoin balance",
            "balance": ZERO_BALANCE,
        })),
    )
        .into_response()
}

/// GET /api/bitcoin/balance?address=
///
/// Bodies are plain `{ balance }` objects so browsers can call the proxy
/// directly.
pub async fn get_balance(
    State(state): State<AppState>,
    Query(query): Query<BalanceQuery>,
) -> Response {
    let address = query.address.unwrap_or_default();
    let address = address.trim();
    if address.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Bitcoin address is required" })),
        )
            .into_response();
    }

    match state.bitcoin_proxy.balance(address).await {
        Ok(outcome) if outcome.is_stale() => (
            StatusCode::OK,
            Json(json!({ "balance": outcome.balance(), "stale": true })),
        )
            .into_response(),
        Ok(outcome) => (
            StatusCode::OK,
            [(header::CACHE_CONTROL, "public, max-age=300")],
            Json(json!({ "balance": outcome.balance() })),
        )
            .into_response(),
        Err(WalletError::SourceUnavailable(reason)) => {
            tracing::error!(
                "All Bitcoin APIs failed for {}: {}",
                short_address(address),
                reason
            );
            failure(StatusCode::SERVICE_UNAVAILABLE)
        }
        Err(err) => {
            tracing::error!("Bitcoin balance proxy error: {}", err);
            failure(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
