//! HTTP ingestion server implementation using Axum.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use fieldbell_core::traits::RecordStore;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for the ingestion server.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
}

#[derive(Debug, Deserialize)]
struct NotifyRequest {
    user_name: String,
    message: String,
}

/// Queue a report for a named record. The dispatcher picks it up on its
/// next tick; this endpoint never talks to Telegram itself.
async fn notify(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NotifyRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    if body.user_name.trim().is_empty() || body.message.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "ok": false,
                "error": "user_name and message are required",
            })),
        );
    }

    match state
        .store
        .queue_message_by_name(body.user_name.trim(), &body.message)
        .await
    {
        Ok(true) => {
            tracing::info!("📥 Report queued for {} via HTTP", body.user_name.trim());
            (
                StatusCode::CREATED,
                Json(serde_json::json!({
                    "ok": true,
                    "queued_for": body.user_name.trim(),
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                })),
            )
        }
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "ok": false,
                "error": format!("no record named {:?}", body.user_name.trim()),
            })),
        ),
        Err(e) => {
            tracing::error!("❌ Ingestion write failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"ok": false, "error": "store unavailable"})),
            )
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "OK",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Build the Axum router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/notify", post(notify))
        .route("/health", get(health))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Bind and serve until the process stops.
pub async fn serve(state: AppState, port: u16) -> fieldbell_core::Result<()> {
    let router = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("🌐 Ingestion endpoint on http://{addr}/api/notify");
    axum::serve(listener, router)
        .await
        .map_err(|e| fieldbell_core::FieldbellError::Config(format!("http server failed: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use fieldbell_core::types::{OperatorRecord, Role};
    use fieldbell_store::MemoryRecordStore;
    use tower::ServiceExt;

    async fn router_with_alice() -> (Router, Arc<MemoryRecordStore>) {
        let store = Arc::new(MemoryRecordStore::new());
        store
            .insert(OperatorRecord {
                id: 0,
                user_name: "alice".into(),
                role: Role::Waspang,
                telegram_id: Some(1),
                group_id: None,
                message_body: None,
                is_sent: false,
                sent_at: None,
            })
            .await
            .unwrap();
        let router = build_router(AppState {
            store: store.clone(),
        });
        (router, store)
    }

    fn notify_request(json: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/notify")
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_notify_queues_for_known_record() {
        let (router, store) = router_with_alice().await;
        let response = router
            .oneshot(notify_request(
                r#"{"user_name": "alice", "message": "pipeline down"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(store.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_notify_unknown_record_is_404() {
        let (router, store) = router_with_alice().await;
        let response = router
            .oneshot(notify_request(
                r#"{"user_name": "nobody", "message": "hello"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(store.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_notify_rejects_empty_fields() {
        let (router, _) = router_with_alice().await;
        let response = router
            .oneshot(notify_request(r#"{"user_name": "alice", "message": "  "}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _) = router_with_alice().await;
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
