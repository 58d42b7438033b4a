use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use corral_api::config::ServerConfig;
use corral_api::router::build_app_router;
use corral_api::state::AppState;
use corral_db::DbPool;
use corral_engine::{HandlerRegistry, JobView, ProgressPublisher, TaskHandler, UnitError, UnitOutcome};

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        worker_concurrency: 2,
        poll_interval_ms: 50,
        dedup_window_secs: 5,
        retention_max_age_hours: 168,
    }
}

/// Single-unit handler that echoes the job metadata as its result.
struct EchoHandler;

#[async_trait]
impl TaskHandler for EchoHandler {
    async fn execute_unit(
        &self,
        job: &JobView,
        _checkpoint: Option<&Value>,
    ) -> Result<UnitOutcome, UnitError> {
        Ok(UnitOutcome {
            new_checkpoint: None,
            progress_delta: 100,
            counters_patch: json!({}),
            partial_result: Some(json!([job.metadata.clone()])),
            done: true,
        })
    }
}

/// Build the full application router with all middleware layers, using
/// the given database pool and publisher.
///
/// The registry knows the `generate` job type; no worker pool runs, so
/// submitted jobs stay `pending` unless a test mutates them directly.
pub fn build_test_app(pool: DbPool, publisher: ProgressPublisher) -> Router {
    let config = test_config();

    let mut registry = HandlerRegistry::new();
    registry.register("generate", Arc::new(EchoHandler));

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        registry: Arc::new(registry),
        publisher,
    };

    build_app_router(state, &config)
}

/// Issue a GET request against the app.
pub async fn get(app: Router, path: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .uri(path)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Issue a JSON POST request, optionally with an `X-Owner-Id` header.
pub async fn post_json(
    app: Router,
    path: &str,
    owner: Option<&str>,
    body: &Value,
) -> Response<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    if let Some(owner) = owner {
        builder = builder.header("x-owner-id", owner);
    }
    app.oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap()
}

/// Issue a request with an arbitrary method and owner header, no body.
pub async fn request(
    app: Router,
    method: &str,
    path: &str,
    owner: Option<&str>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(owner) = owner {
        builder = builder.header("x-owner-id", owner);
    }
    app.oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Collect a response body as a UTF-8 string (for SSE payloads).
pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
