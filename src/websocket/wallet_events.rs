use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, State},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, timeout, Duration};

use crate::{
    api::AppState,
    constants::{WS_CLIENT_TIMEOUT_SECS, WS_HEARTBEAT_INTERVAL_SECS},
    models::{ConnectedWalletSet, WalletEvent},
    services::Notice,
};

fn connected_payload(wallets: &ConnectedWalletSet) -> String {
    json!({
        "type": "connected",
        "message": "Connected to wallet event stream",
        "wallets": wallets,
    })
    .to_string()
}

fn event_payload(event: &WalletEvent) -> String {
    json!({ "type": "wallet_event", "event": event }).to_string()
}

fn notice_payload(notice: &Notice) -> String {
    json!({ "type": "notice", "notice": notice }).to_string()
}

/// WebSocket handler streaming wallet events and notices
pub async fn handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before sending the snapshot so nothing is missed in between.
    let mut events = state.controller.subscribe_events();
    let mut notices = state.notices.subscribe();

    let hello = connected_payload(&state.controller.snapshot());
    if sender.send(Message::Text(hello.into())).await.is_err() {
        return;
    }

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = interval(Duration::from_secs(WS_HEARTBEAT_INTERVAL_SECS));

        loop {
            let payload = tokio::select! {
                _ = heartbeat.tick() => {
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                    continue;
                }
                result = events.recv() => match result {
                    Ok(event) => event_payload(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("WebSocket client lagged by {} wallet events", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                result = notices.recv() => match result {
                    Ok(notice) => notice_payload(&notice),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
            };

            if sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        loop {
            let next_msg =
                timeout(Duration::from_secs(WS_CLIENT_TIMEOUT_SECS), receiver.next()).await;
            let msg = match next_msg {
                Ok(Some(Ok(msg))) => msg,
                Ok(Some(Err(_))) | Ok(None) => break,
                Err(_) => {
                    tracing::info!("WebSocket client timeout");
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    tracing::debug!("Received: {}", text);
                }
                Message::Close(_) => {
                    tracing::info!("Client disconnected");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    tracing::info!("Wallet event stream closed");
}
