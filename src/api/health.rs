use axum::{extract::State, Json};
use serde::Serialize;
use super::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub connected_wallets: usize,
    pub observer: String,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let observer = if state.controller.observer().is_watching() {
        "watching".to_string()
    } else {
        "idle".to_string()
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        connected_wallets: state.controller.snapshot().connected().len(),
        observer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::test_state;
    use crate::providers::test_support::MockSet;

    #[tokio::test]
    async fn health_reports_observer_state() {
        // Memastikan health check melaporkan status observer
        let mocks = MockSet::new();
        let Json(health) = health_check(State(test_state("health", &mocks, vec![]))).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.observer, "watching");
        assert_eq!(health.connected_wallets, 0);
    }
}
