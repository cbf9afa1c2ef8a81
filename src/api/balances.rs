use axum::{extract::State, Json};
use serde::Serialize;

use super::AppState;
use crate::models::{ApiResponse, Balance, ConnectedWalletSet, TokenMap};

#[derive(Debug, Serialize)]
pub struct BalancesResponse {
    pub wallets: ConnectedWalletSet,
    pub balances: Vec<Balance>,
}

#[derive(Debug, Serialize)]
pub struct TokensResponse {
    pub count: usize,
    pub tokens: TokenMap,
}

/// GET /api/v1/balances
pub async fn get_balances(State(state): State<AppState>) -> Json<ApiResponse<BalancesResponse>> {
    let wallets = state.controller.snapshot();
    let balances = state.balances.aggregate(&wallets).await;
    Json(ApiResponse::success(BalancesResponse { wallets, balances }))
}

/// GET /api/v1/tokens
pub async fn get_tokens(State(state): State<AppState>) -> Json<ApiResponse<TokensResponse>> {
    let tokens = state.tokens.get_tokens().await;
    Json(ApiResponse::success(TokensResponse {
        count: tokens.len(),
        tokens: tokens.as_ref().clone(),
    }))
}
