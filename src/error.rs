use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failure taxonomy shared by provider adapters, the observer and the
/// balance pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("Wallet provider not installed")]
    ProviderNotInstalled,

    #[error("Connection rejected by user")]
    UserRejected,

    #[error("Connection timed out")]
    ConnectTimeout,

    // Not a failure: the caller is being sent to a wallet deep link.
    #[error("Redirecting to wallet: {url}")]
    Redirecting { url: String },

    #[error("A connection attempt is already in progress")]
    ConnectInProgress,

    #[error("Wallet is locked or not connected")]
    NotConnected,

    #[error("Wallet provider error: {0}")]
    Provider(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Balance source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("All RPC endpoints exhausted")]
    AllEndpointsExhausted,

    #[error("Token metadata unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Malformed persisted state: {0}")]
    MalformedPersistedState(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

fn wallet_error_status(err: &WalletError) -> (StatusCode, &'static str) {
    match err {
        WalletError::ProviderNotInstalled => (StatusCode::NOT_FOUND, "PROVIDER_NOT_INSTALLED"),
        WalletError::UserRejected => (StatusCode::FORBIDDEN, "USER_REJECTED"),
        WalletError::ConnectTimeout => (StatusCode::GATEWAY_TIMEOUT, "CONNECT_TIMEOUT"),
        WalletError::Redirecting { .. } => (StatusCode::ACCEPTED, "REDIRECTING"),
        WalletError::ConnectInProgress => (StatusCode::CONFLICT, "CONNECT_IN_PROGRESS"),
        WalletError::NotConnected => (StatusCode::CONFLICT, "NOT_CONNECTED"),
        WalletError::InvalidAddress(_) => (StatusCode::BAD_REQUEST, "INVALID_ADDRESS"),
        WalletError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT_EXCEEDED"),
        WalletError::Provider(_) => (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR"),
        WalletError::SourceUnavailable(_)
        | WalletError::AllEndpointsExhausted
        | WalletError::MetadataUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "SOURCE_UNAVAILABLE")
        }
        WalletError::MalformedPersistedState(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "MALFORMED_STATE")
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Wallet(ref err) => {
                let (status, code) = wallet_error_status(err);
                (status, code, err.to_string())
            }
            AppError::BadRequest(ref msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = Json(ErrorResponse {
            success: false,
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: None,
            },
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
