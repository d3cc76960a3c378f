#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

use autocrm_api::auth::jwt::{generate_access_token, JwtConfig};
use autocrm_api::auth::password::hash_password;
use autocrm_api::config::ServerConfig;
use autocrm_api::router::build_app_router;
use autocrm_api::state::AppState;
use autocrm_api::triage::{TriageConfig, TriageService};
use autocrm_api::ws::WsManager;
use autocrm_core::roles::Role;
use autocrm_core::types::DbId;
use autocrm_db::models::profile::{CreateProfile, Profile};
use autocrm_db::repositories::ProfileRepo;
use autocrm_events::{EventBus, TicketFeed};

pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        jwt: JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            access_token_expiry_mins: 15,
        },
        triage: TriageConfig {
            webhook_secret: Some(WEBHOOK_SECRET.to_string()),
            timeout_secs: 5,
            ..TriageConfig::default()
        },
    }
}

/// State with triage disabled, sharing one event bus with the caller.
pub fn test_state(pool: PgPool) -> AppState {
    AppState {
        pool,
        config: Arc::new(test_config()),
        ws_manager: Arc::new(WsManager::new()),
        event_bus: Arc::new(EventBus::default()),
        ticket_feed: Arc::new(TicketFeed::new()),
        triage: None,
    }
}

/// Build the full application router with all middleware layers, using the
/// given database pool.
pub fn build_test_app(pool: PgPool) -> Router {
    build_app_router(test_state(pool), &test_config())
}

/// Build the router with a triage service wired in.
pub fn build_test_app_with_triage(state: AppState, triage: Arc<TriageService>) -> Router {
    let state = AppState {
        triage: Some(triage),
        ..state
    };
    build_app_router(state, &test_config())
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub const TEST_PASSWORD: &str = "test_password_123";

/// Insert a profile with a known password.
pub async fn create_profile(pool: &PgPool, name: &str, role: Role) -> Profile {
    let hashed = hash_password(TEST_PASSWORD).expect("hashing should succeed");
    ProfileRepo::create(
        pool,
        &CreateProfile {
            name: name.to_string(),
            email: format!("{}@test.com", name.to_lowercase()),
            password_hash: Some(hashed),
            role,
        },
    )
    .await
    .expect("profile creation should succeed")
}

/// A valid access token for a profile.
pub fn token_for(id: DbId, role: Role) -> String {
    generate_access_token(id, role, &test_config().jwt).expect("token generation should succeed")
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.expect("request should be served")
}

fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, json_request(Method::POST, uri, None, body)).await
}

pub async fn post_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    send(app, json_request(Method::POST, uri, Some(token), body)).await
}

pub async fn put_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    send(app, json_request(Method::PUT, uri, Some(token), body)).await
}

pub async fn delete_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

/// Collect a response body and parse it as JSON.
pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("body should be readable")
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should be readable")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body should be JSON")
}
