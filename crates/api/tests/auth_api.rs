//! HTTP-level tests for login and token enforcement.

mod common;

use axum::http::StatusCode;
use common::{
    body_json, get, post_json, post_json_auth, FakeProvider, TEST_EMAIL, TEST_SECRET,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use pixelfan_api::auth::jwt::{Claims, ACCESS_TOKEN_TYPE};
use serde_json::json;

fn sign(claims: &Claims) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .unwrap()
}

fn claims(exp_offset_secs: i64, token_type: &str) -> Claims {
    let now = chrono::Utc::now().timestamp();
    Claims {
        sub: TEST_EMAIL.to_string(),
        exp: now + exp_offset_secs,
        iat: now - 3600,
        token_type: token_type.to_string(),
        jti: uuid::Uuid::new_v4().to_string(),
    }
}

fn generate_body() -> serde_json::Value {
    json!({ "prompt": "a cat", "num_images": 5 })
}

#[tokio::test]
async fn login_returns_bearer_token() {
    let app = common::build_test_app(FakeProvider::succeeding());
    let response = post_json(
        app.router(),
        "/api/auth/login",
        json!({ "email": "test@example.com", "password": "password123" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["access_token"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(json["token_type"], "bearer");
    assert_eq!(json["expires_in"], 3600);
}

#[tokio::test]
async fn login_with_wrong_password_is_401() {
    let app = common::build_test_app(FakeProvider::succeeding());
    let response = post_json(
        app.router(),
        "/api/auth/login",
        json!({ "email": "test@example.com", "password": "nope" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn login_with_unknown_email_is_401() {
    let app = common::build_test_app(FakeProvider::succeeding());
    let response = post_json(
        app.router(),
        "/api/auth/login",
        json!({ "email": "someone@example.com", "password": "password123" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn generate_without_token_is_401_and_creates_nothing() {
    let app = common::build_test_app(FakeProvider::succeeding());
    let response = post_json(app.router(), "/api/generate", generate_body()).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(app.state.store.is_empty().await);
}

#[tokio::test]
async fn expired_token_is_401_and_creates_nothing() {
    let app = common::build_test_app(FakeProvider::succeeding());
    let token = sign(&claims(-600, ACCESS_TOKEN_TYPE));

    let response = post_json_auth(app.router(), "/api/generate", generate_body(), &token).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Invalid or expired token");
    assert!(app.state.store.is_empty().await);
}

#[tokio::test]
async fn token_expired_seconds_ago_is_401() {
    let app = common::build_test_app(FakeProvider::succeeding());
    let token = sign(&claims(-30, ACCESS_TOKEN_TYPE));

    let response = post_json_auth(app.router(), "/api/generate", generate_body(), &token).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(app.state.store.is_empty().await);
}

#[tokio::test]
async fn non_access_token_is_401() {
    let app = common::build_test_app(FakeProvider::succeeding());
    let token = sign(&claims(600, "refresh"));

    let response = post_json_auth(app.router(), "/api/generate", generate_body(), &token).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(app.state.store.is_empty().await);
}

#[tokio::test]
async fn malformed_authorization_header_is_401() {
    let app = common::build_test_app(FakeProvider::succeeding());
    let request = axum::http::Request::builder()
        .uri("/api/generate/some-id")
        .header("authorization", "Token abc")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = common::send(app.router(), request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn read_endpoints_require_a_token() {
    let app = common::build_test_app(FakeProvider::succeeding());
    for uri in [
        "/api/generate/abc",
        "/api/generate/abc/metrics",
        "/api/generate/abc/stream",
    ] {
        let response = get(app.router(), uri).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
    }
}

#[tokio::test]
async fn token_query_parameter_is_accepted() {
    let app = common::build_test_app(FakeProvider::succeeding());
    let token = common::login(app.router()).await;
    let job_id = common::create_job(app.router(), &token, "a cat", 5).await;

    let response = get(app.router(), &format!("/api/generate/{job_id}?token={token}")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(app.router(), &format!("/api/generate/{job_id}?token=garbage")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
