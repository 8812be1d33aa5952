#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use pixelfan_api::auth::credentials::DemoCredentials;
use pixelfan_api::auth::jwt::JwtConfig;
use pixelfan_api::config::{GenerationBackend, ServerConfig};
use pixelfan_api::engine::{JobRunner, RunnerConfig};
use pixelfan_api::router::build_app_router;
use pixelfan_api::state::AppState;
use pixelfan_api::ws::WsManager;
use pixelfan_core::generation::{GenerationPort, PollSchedule, PollStatus, ProviderError};
use pixelfan_replicate::api::DEFAULT_BASE_URL;
use pixelfan_replicate::ReplicateConfig;
use pixelfan_store::JobStore;
use serde_json::Value;
use tower::ServiceExt;

pub const TEST_EMAIL: &str = "test@example.com";
pub const TEST_PASSWORD: &str = "password123";
pub const TEST_SECRET: &str = "test-secret-that-is-long-enough-for-hmac";

// ---------------------------------------------------------------------------
// Fake provider
// ---------------------------------------------------------------------------

/// Provider whose predictions all succeed or all fail after `delay`.
pub struct FakeProvider {
    delay: Duration,
    succeed: bool,
    pub submitted: AtomicUsize,
}

impl FakeProvider {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            delay: Duration::from_millis(10),
            succeed: true,
            submitted: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            delay: Duration::from_millis(5),
            succeed: false,
            submitted: AtomicUsize::new(0),
        })
    }

    pub fn submissions(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationPort for FakeProvider {
    async fn submit(&self, _prompt: &str) -> Result<String, ProviderError> {
        let n = self.submitted.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(format!("pred-{n}"))
    }

    async fn poll(&self, prediction_id: &str) -> Result<PollStatus, ProviderError> {
        Ok(if self.succeed {
            PollStatus::Succeeded(format!("https://img.test/{prediction_id}.png"))
        } else {
            PollStatus::Failed("model exploded".to_string())
        })
    }
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        jwt: JwtConfig {
            secret: TEST_SECRET.to_string(),
            access_token_expiry_mins: 60,
        },
        auth_email: TEST_EMAIL.to_string(),
        auth_password: TEST_PASSWORD.to_string(),
        max_concurrency: 5,
        retry_attempts: 2,
        backend: GenerationBackend::Simulated,
        replicate: ReplicateConfig {
            api_token: String::new(),
            model: "stability-ai/stable-diffusion".to_string(),
            model_version: None,
            base_url: DEFAULT_BASE_URL.to_string(),
        },
        ws_heartbeat_secs: 15,
    }
}

/// Argon2 is slow in debug builds, so the demo hash is computed once per
/// test binary.
fn credentials() -> Arc<DemoCredentials> {
    static CREDENTIALS: OnceLock<Arc<DemoCredentials>> = OnceLock::new();
    Arc::clone(CREDENTIALS.get_or_init(|| {
        Arc::new(DemoCredentials::new(TEST_EMAIL, TEST_PASSWORD).expect("hashing should succeed"))
    }))
}

/// The router plus handles on the state behind it.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

impl TestApp {
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

/// Build the full application router over an in-memory store and `provider`,
/// with millisecond backoff and polling.
pub fn build_test_app(provider: Arc<dyn GenerationPort>) -> TestApp {
    let config = test_config();
    let store = Arc::new(JobStore::new());
    let runner = JobRunner::new(
        Arc::clone(&store),
        provider,
        RunnerConfig {
            max_concurrency: config.max_concurrency,
            max_retries: config.retry_attempts,
            backoff_unit: Duration::from_millis(1),
            poll_schedule: PollSchedule {
                fast_interval: Duration::from_millis(1),
                ..PollSchedule::default()
            },
        },
    );

    let state = AppState {
        config: Arc::new(config.clone()),
        store,
        runner,
        ws_manager: Arc::new(WsManager::new()),
        credentials: credentials(),
    };

    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
    }
}

/// Serve `app` on an ephemeral port and return its address.
pub async fn spawn_server(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response {
    let request = Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn post_json_auth(app: Router, uri: &str, body: Value, token: &str) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

// ---------------------------------------------------------------------------
// Flow helpers
// ---------------------------------------------------------------------------

/// Log in with the demo credential and return the access token.
pub async fn login(app: Router) -> String {
    let response = post_json(
        app,
        "/api/auth/login",
        serde_json::json!({ "email": TEST_EMAIL, "password": TEST_PASSWORD }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["access_token"]
        .as_str()
        .unwrap()
        .to_string()
}

/// Create a job and return its id.
pub async fn create_job(app: Router, token: &str, prompt: &str, num_images: u32) -> String {
    let response = post_json_auth(
        app,
        "/api/generate",
        serde_json::json!({ "prompt": prompt, "num_images": num_images }),
        token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["job_id"]
        .as_str()
        .unwrap()
        .to_string()
}

/// Poll the snapshot endpoint until the job is terminal.
pub async fn wait_for_terminal(app: Router, token: &str, job_id: &str) -> Value {
    for _ in 0..300 {
        let response = get_auth(app.clone(), &format!("/api/generate/{job_id}"), token).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        if json["status"] == "completed" || json["status"] == "failed" {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {job_id} did not reach a terminal state");
}
