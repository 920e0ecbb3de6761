//! HTTP receiver for JIRA webhooks
//!
//! # Routes
//!
//! - `POST /webhook/{customer_id}/{integration_instance_id}` - Process one delivery
//! - `GET /health` - Liveness check
//! - `GET /metrics` - Prometheus text exposition
//!
//! A delivery answers 202 once its patches are written, 400 when the payload
//! cannot be understood, and 500 when the sink fails.

use super::processor::{WebhookOutcome, WebhookProcessor};
use crate::metrics;
use crate::{AgileSyncError, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Largest accepted delivery
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Shared server state
pub struct AppState {
    pub processor: WebhookProcessor,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// HTTP server wrapping a [`WebhookProcessor`]
pub struct WebhookServer {
    state: Arc<AppState>,
}

impl WebhookServer {
    pub fn new(processor: WebhookProcessor) -> Self {
        Self {
            state: Arc::new(AppState { processor }),
        }
    }

    pub fn router(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/metrics", get(prometheus_metrics))
            .route(
                "/webhook/{customer_id}/{integration_instance_id}",
                post(receive_webhook),
            )
            .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
            .with_state(state)
    }

    /// Run the server on the given address
    pub async fn run(self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AgileSyncError::Config(format!("cannot bind {}: {}", addr, e)))?;

        tracing::info!(addr = addr, "Webhook receiver listening");

        axum::serve(listener, Self::router(self.state)).await?;
        Ok(())
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn prometheus_metrics() -> Response {
    match metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e),
    }
}

async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    Path((customer_id, integration_instance_id)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    // dispatch writes to the pipe synchronously; keep it off the async workers
    let customer = customer_id.clone();
    let result = tokio::task::spawn_blocking(move || {
        state
            .processor
            .dispatch(&customer, &integration_instance_id, &body)
    })
    .await
    .unwrap_or_else(|e| Err(AgileSyncError::Task(format!("webhook worker failed: {}", e))));

    match result {
        Ok(outcome) => (StatusCode::ACCEPTED, Json::<WebhookOutcome>(outcome)).into_response(),
        Err(e) if e.is_payload_error() => {
            tracing::warn!(customer = %customer_id, error = %e, "Rejected webhook payload");
            error_response(StatusCode::BAD_REQUEST, &e)
        }
        Err(e) => {
            tracing::error!(customer = %customer_id, error = %e, "Webhook processing failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e)
        }
    }
}

fn error_response(status: StatusCode, error: &AgileSyncError) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::{MemoryPipe, Pipe, Record};
    use crate::webhook::users::RecordingUserManager;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    struct FailingPipe;

    impl Pipe for FailingPipe {
        fn write(&self, _record: Record) -> Result<()> {
            Err(AgileSyncError::Pipe("disk full".to_string()))
        }
    }

    fn app(pipe: Arc<dyn Pipe>) -> Router {
        let processor = WebhookProcessor::new(pipe, Arc::new(RecordingUserManager::new()));
        WebhookServer::router(Arc::new(AppState { processor }))
    }

    fn post_webhook(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/webhook/1234/5678")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), MAX_BODY_SIZE)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = app(Arc::new(MemoryPipe::new()))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_webhook_accepted() {
        let pipe = Arc::new(MemoryPipe::new());
        let response = app(pipe.clone())
            .oneshot(post_webhook(
                r#"{"webhookEvent": "jira:issue_deleted", "issue": {"id": "10042"}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        assert_eq!(body["event"], "jira:issue_deleted");
        assert_eq!(body["handled"], true);
        assert_eq!(pipe.updates().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_event_is_accepted_but_unhandled() {
        let pipe = Arc::new(MemoryPipe::new());
        let response = app(pipe.clone())
            .oneshot(post_webhook(r#"{"webhookEvent": "worklog_created"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(json_body(response).await["handled"], false);
        assert!(pipe.is_empty());
    }

    #[tokio::test]
    async fn test_bad_payload_is_400() {
        let response = app(Arc::new(MemoryPipe::new()))
            .oneshot(post_webhook(r#"{"webhookEvent": "sprint_deleted", "sprint": {}}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("sprint id"));
    }

    #[tokio::test]
    async fn test_sink_failure_is_500() {
        let response = app(Arc::new(FailingPipe))
            .oneshot(post_webhook(
                r#"{"webhookEvent": "board_deleted", "board": {"id": 3}}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_null_board_id_is_400() {
        let pipe = Arc::new(MemoryPipe::new());
        let response = app(pipe.clone())
            .oneshot(post_webhook(
                r#"{"webhookEvent": "board_updated", "board": {"id": null, "name": "x"}}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(pipe.is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_dispatch_on_single_threaded_runtime() {
        let pipe = Arc::new(MemoryPipe::new());
        let router = app(pipe.clone());
        for id in 10000..10004 {
            let response = router
                .clone()
                .oneshot(post_webhook(&format!(
                    r#"{{"webhookEvent": "jira:issue_deleted", "issue": {{"id": "{}"}}}}"#,
                    id
                )))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::ACCEPTED);
        }
        assert_eq!(pipe.updates().len(), 4);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        metrics::record_webhook("jira:issue_deleted", "accepted");
        let response = app(Arc::new(MemoryPipe::new()))
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("agilesync_webhook_events_total"));
    }
}
