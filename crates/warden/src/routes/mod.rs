//! Operator HTTP endpoints.

use axum::{Router, routing::get};
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::state::AppState;

mod gate;
mod health;

/// Requests slower than this get a 408
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/metrics", get(health::metrics))
        .route("/pending/{chat_id}", get(gate::pending_for_chat))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;
    use warden_common::{ChatId, JoinOutcome, JoiningUser, UserId};

    async fn get_json(state: AppState, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = create_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health_reports_version() {
        let (status, body) = get_json(AppState::for_tests(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_ready_follows_poller() {
        let state = AppState::for_tests();
        let (status, _) = get_json(state.clone(), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        state.set_ready(true);
        let (status, body) = get_json(state, "/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["telegram"], true);
    }

    #[tokio::test]
    async fn test_metrics_exposes_counters() {
        let state = AppState::for_tests();
        // the test Bot API is unreachable, so the join is aborted
        let outcome = state
            .gate
            .on_user_joined(ChatId(-1001), JoiningUser::new(UserId(7), "Ana"))
            .await
            .unwrap();
        assert!(matches!(outcome, JoinOutcome::Aborted { .. }));

        let (status, body) = get_json(state, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["joins"], 1);
        assert_eq!(body["gateway_failures"], 1);
        assert_eq!(body["challenges_issued"], 0);
        assert_eq!(body["pending"], 0);
    }

    #[tokio::test]
    async fn test_pending_lists_chat() {
        let (status, body) = get_json(AppState::for_tests(), "/pending/-1001").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["chat_id"], -1001);
        assert_eq!(body["pending"], serde_json::json!([]));

        let (status, _) = get_json(AppState::for_tests(), "/pending/not-a-chat").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (status, _) = get_json(AppState::for_tests(), "/admin").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
