use crate::cache::memory::InMemoryCache;
use crate::cache::Cache;
use crate::config::AppConfig;
use crate::create_app;
use crate::state::AppState;
use axum::body::Body;
use axum::Router;
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use log::LevelFilter;
use serde_json::Value;
use tower::ServiceExt;

/// Defaults with a small capacity and a short flush period
pub(crate) fn test_config() -> AppConfig {
    let mut config = AppConfig::from_defaults().expect("default configuration is valid");
    config.pipeline.capacity = 100;
    config.pipeline.flush_period_ms = 50;
    config.pipeline.commit_timeout_secs = 1;
    config.cache.ttl_secs = 5;
    config
}

/// Started state with an in-memory cache
pub(crate) fn test_state(config: AppConfig) -> AppState {
    let cache = InMemoryCache::new(config.cache.memory.capacity_mib)
        .expect("Failed to create cache");
    AppState::start(config, Cache::InMemory(cache))
}

/// Test fixture wrapping the application router and its state.
///
/// Call [`TestFixture::shutdown`] at the end of a test to stop the background tasks.
pub(crate) struct TestFixture {
    pub app: Router,
    pub state: AppState,
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        Self::setup_logger(LevelFilter::Debug);
        let state = test_state(config);
        let app = create_app(state.clone());
        Self { app, state }
    }

    pub fn setup_logger(level: LevelFilter) {
        let _ = env_logger::builder()
            .filter_level(level)
            .is_test(true)
            .try_init();
    }

    pub async fn get(&self, uri: impl AsRef<str>) -> TestResponse {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri.as_ref())
            .body(Body::empty())
            .expect("Failed to build request");

        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        let json = if body.is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_slice(&body).unwrap_or_else(|_| serde_json::json!({}))
        };

        TestResponse { status, json }
    }

    pub async fn shutdown(self) {
        self.state.shutdown().await;
    }
}

/// Status and JSON body of a response
pub(crate) struct TestResponse {
    pub status: StatusCode,
    pub json: Value,
}

impl TestResponse {
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {} but got {} with body: {}",
            expected,
            self.status,
            serde_json::to_string_pretty(&self.json).unwrap_or_default()
        );
        self
    }

    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }
}
