pub mod fakes;


use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use crate::models::AppConfig;
use crate::service::server::build_app;
use crate::service::state::AppState;
use fakes::{FakeTokenSource, FakeVisitSender};

pub(crate) struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub source: Arc<FakeTokenSource>,
    pub sender: Arc<FakeVisitSender>,
}

impl TestApp {
    pub(crate) async fn call(&self, method: Method, uri: &str) -> (StatusCode, Value) {
        let response = self
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, body)
    }

    pub(crate) async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.call(Method::GET, uri).await
    }

    // Polls a job until it reaches a terminal status.
    pub(crate) async fn wait_for_job(&self, id: &str) -> Value {
        for _ in 0..200 {
            let (status, body) = self.get(&format!("/jobs/{}", id)).await;
            assert_eq!(status, StatusCode::OK);
            let state = body["status"].as_str().unwrap_or_default();
            if !matches!(state, "queued" | "processing") {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not finish in time", id);
    }

    pub(crate) async fn shutdown(&self) {
        self.state.runtime.shutdown.cancel();
        self.state.core.pool.shutdown(Duration::from_secs(5)).await;
    }
}

// Fast defaults: no delay, single attempt.
pub(crate) fn test_config() -> AppConfig {
    let mut config = AppConfig::new();
    config.dispatch.delay_ms = 0;
    config.dispatch.max_attempts = 1;
    config.jobs.workers = 2;
    config.jobs.queue_capacity = 4;
    config
}

pub(crate) fn build_test_app(
    config: AppConfig,
    source: FakeTokenSource,
    sender: FakeVisitSender,
) -> TestApp {
    let source = Arc::new(source);
    let sender = Arc::new(sender);
    let state = AppState::build(
        &config,
        source.clone(),
        sender.clone(),
        CancellationToken::new(),
    );
    TestApp {
        app: build_app(state.clone(), &config),
        state,
        source,
        sender,
    }
}
