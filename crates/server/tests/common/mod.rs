//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with mock dependencies injected, enabling comprehensive E2E testing
//! without a browser-automation driver or real downloads.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use atelier_core::{
    spawn_engine, ArtifactStore, Config, EngineHandle, OptionsStore, ServerConfig, StorageConfig,
    WorkerHost,
    testing::{MockArtifactStore, MockWorkerHost},
};

use atelier_server::api::driver::DriverHost;
use atelier_server::state::AppState;

/// Re-export fixtures for test convenience
pub use atelier_core::testing::fixtures;

/// Test fixture for E2E testing with mock dependencies.
///
/// Provides an in-process server whose engine talks to a mock worker
/// host and a mock artifact store, so requests exercise the full API
/// surface while runs stay fully controllable from the test.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_start_run() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/run/start", json!({
///         "prompts": ["a quiet harbor at dawn"]
///     })).await;
///
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Engine handle, for driving runs and subscribing to progress
    pub engine: EngineHandle,
    /// Mock worker host - inspect opened workers and delivered commands
    pub host: Arc<MockWorkerHost>,
    /// Mock artifact store - inspect begun downloads
    pub store: Arc<MockArtifactStore>,
    /// Temporary directory for options file and artifact output
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        // Create mocks
        let host = Arc::new(MockWorkerHost::new());
        let store = Arc::new(MockArtifactStore::new());

        // Create config rooted in the temp dir
        let static_dir = temp_dir.path().join("dashboard");
        std::fs::create_dir_all(&static_dir).expect("Failed to create static dir");
        std::fs::write(static_dir.join("index.html"), "<!doctype html><title>atelier</title>")
            .expect("Failed to write index.html");

        let config = Config {
            server: ServerConfig {
                host: IpAddr::V4(Ipv4Addr::LOCALHOST),
                port: 0, // Not used for in-process testing
                static_dir,
            },
            engine: fixtures::fast_config(),
            storage: StorageConfig {
                output_root: temp_dir.path().join("output"),
                options_path: temp_dir.path().join("options.toml"),
            },
        };

        let options_store = OptionsStore::new(config.storage.options_path.clone());

        // Spawn the engine against the mocks
        let store_for_engine = Arc::clone(&store);
        let engine = spawn_engine(
            config.engine.clone(),
            options_store.clone(),
            Arc::clone(&host) as Arc<dyn WorkerHost>,
            move |_| store_for_engine as Arc<dyn ArtifactStore>,
        );

        // The driver route is live but no driver connects in these tests.
        let driver_host = Arc::new(DriverHost::new());

        // Create app state and router
        let state = Arc::new(AppState::new(
            config,
            engine.clone(),
            options_store,
            driver_host,
        ));
        let router = atelier_server::api::create_router(state);

        Self {
            router,
            engine,
            host,
            store,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request with no body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        self.send(request).await
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
