//! HTTP-level tests for the /graphql dispatch: auth gating, refresh-token
//! audit suppression, and payload sanitization observed through the full
//! middleware stack.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;

use chronicle_server::api::{self, AppState};
use chronicle_server::audit::{
    ActivityLogRecorder, AuditedCollection, MemoryAuditSink, SnapshotCache, REDACTION_MARKER,
};
use chronicle_server::config::Config;
use chronicle_server::features::auth::jwt::TokenService;
use chronicle_server::features::FeatureState;
use chronicle_server::store::{DocumentStore, MemoryStore};

struct TestServer {
    app: Router,
    sink: Arc<MemoryAuditSink>,
    tokens: TokenService,
}

fn test_server() -> TestServer {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(MemoryAuditSink::new());
    let recorder = Arc::new(ActivityLogRecorder::new(sink.clone()));
    let snapshots = Arc::new(SnapshotCache::default());
    let users = AuditedCollection::new(
        "users",
        store as Arc<dyn DocumentStore>,
        recorder,
        snapshots,
    );
    let tokens = TokenService::new("test-access", "test-refresh");
    let state = AppState {
        features: FeatureState {
            users,
            audit: sink.clone(),
            tokens: tokens.clone(),
        },
        backend: "memory",
    };
    TestServer {
        app: api::app(state, &Config::default()),
        sink,
        tokens,
    }
}

fn graphql_request(body: JsonValue, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/graphql")
        .header("content-type", "application/json");
    if let Some(token) = bearer {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> JsonValue {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn signup_body(email: &str) -> JsonValue {
    json!({
        "operationName": "signup",
        "variables": {
            "signupInput": {
                "firstName": "Alice",
                "lastName": "Smith",
                "email": email,
                "password": "Secret123!",
                "gender": "FEMALE"
            }
        }
    })
}

async fn signup(server: &TestServer, email: &str) -> JsonValue {
    let response = server
        .app
        .clone()
        .oneshot(graphql_request(signup_body(email), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

#[tokio::test]
async fn health_reports_backend() {
    let server = test_server();
    let response = server
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["backend"], "memory");
}

#[tokio::test]
async fn signup_returns_tokens_and_redacts_audit_payload() {
    let server = test_server();
    let body = signup(&server, "a@b.com").await;

    let data = &body["data"]["signup"];
    assert!(data["accessToken"].as_str().is_some());
    assert!(data["refreshToken"].as_str().is_some());
    assert_eq!(data["user"]["email"], "a@b.com");
    // The password hash never leaves the store layer.
    assert!(data["user"].get("password").is_none());

    let entries = server.sink.wait_for_entries(1).await;
    let payload = entries[0].payload.as_ref().unwrap();
    assert_eq!(payload["signupInput"]["password"], json!(REDACTION_MARKER));
    assert_eq!(payload["signupInput"]["email"], json!("a@b.com"));
}

#[tokio::test]
async fn login_succeeds_and_rejects_bad_credentials() {
    let server = test_server();
    signup(&server, "a@b.com").await;

    let ok = server
        .app
        .clone()
        .oneshot(graphql_request(
            json!({
                "operationName": "login",
                "variables": {"loginInput": {"email": "a@b.com", "password": "Secret123!"}}
            }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
    let body = body_json(ok).await;
    assert!(body["data"]["login"]["accessToken"].as_str().is_some());

    let bad = server
        .app
        .clone()
        .oneshot(graphql_request(
            json!({
                "operationName": "login",
                "variables": {"loginInput": {"email": "a@b.com", "password": "wrong"}}
            }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(bad).await;
    assert_eq!(body["errors"][0]["message"], "Invalid credentials");
}

#[tokio::test]
async fn user_mutations_require_authentication() {
    let server = test_server();

    let response = server
        .app
        .clone()
        .oneshot(graphql_request(
            json!({
                "operationName": "getUsers",
                "variables": {}
            }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let garbage_token = server
        .app
        .clone()
        .oneshot(graphql_request(
            json!({
                "operationName": "getUsers",
                "variables": {}
            }),
            Some("not-a-jwt"),
        ))
        .await
        .unwrap();
    assert_eq!(garbage_token.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn authenticated_update_lands_in_activity_log_with_user_id() {
    let server = test_server();
    let body = signup(&server, "a@b.com").await;
    let user_id = body["data"]["signup"]["user"]["_id"].as_str().unwrap().to_string();
    server.sink.wait_for_entries(1).await;

    let token = server.tokens.issue_pair(&user_id, "a@b.com").unwrap();
    let response = server
        .app
        .clone()
        .oneshot(graphql_request(
            json!({
                "operationName": "updateUser",
                "variables": {"input": {"_id": user_id, "firstName": "Bob"}}
            }),
            Some(&token.access_token),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["updateUser"]["firstName"], "Bob");

    let entries = server.sink.wait_for_entries(2).await;
    let entry = entries.last().unwrap();
    assert_eq!(entry.action, "UPDATE");
    assert_eq!(entry.user_id.as_deref(), Some(user_id.as_str()));
    let changes = entry.changes.as_ref().unwrap();
    assert_eq!(changes["before"], json!({"firstName": "Alice"}));
    assert_eq!(changes["after"], json!({"firstName": "Bob"}));
}

#[tokio::test]
async fn refresh_token_operation_is_never_audited() {
    let server = test_server();
    let body = signup(&server, "a@b.com").await;
    let refresh_token = body["data"]["signup"]["refreshToken"].as_str().unwrap().to_string();
    server.sink.wait_for_entries(1).await;

    let response = server
        .app
        .clone()
        .oneshot(graphql_request(
            json!({
                "operationName": "refreshToken",
                "variables": {"refreshTokenInput": {"refreshToken": refresh_token}}
            }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["data"]["refreshToken"]["accessToken"].as_str().is_some());

    // Only the signup CREATE entry exists; the refresh left no trace.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let entries = server.sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, "CREATE");
}

#[tokio::test]
async fn activity_logs_operation_returns_the_trail() {
    let server = test_server();
    let body = signup(&server, "a@b.com").await;
    let user_id = body["data"]["signup"]["user"]["_id"].as_str().unwrap().to_string();
    server.sink.wait_for_entries(1).await;

    let token = server.tokens.issue_pair(&user_id, "a@b.com").unwrap();
    let response = server
        .app
        .clone()
        .oneshot(graphql_request(
            json!({
                "operationName": "activityLogs",
                "variables": {"input": {"collection_name": "users"}}
            }),
            Some(&token.access_token),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let logs = body["data"]["activityLogs"].as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["action"], "CREATE");
}

#[tokio::test]
async fn unknown_operation_is_rejected() {
    let server = test_server();
    let response = server
        .app
        .clone()
        .oneshot(graphql_request(
            json!({"operationName": "dropAllTables", "variables": {}}),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let missing_name = server
        .app
        .clone()
        .oneshot(graphql_request(json!({"variables": {}}), None))
        .await
        .unwrap();
    assert_eq!(missing_name.status(), StatusCode::BAD_REQUEST);
}
