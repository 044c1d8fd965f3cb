//! Dispatch pipeline integration tests for `POST /cli`, `GET /health`, and
//! the error mapping, driven through the router in-process.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

use credgate::config;
use credgate::plugins::{PluginRegistry, ProxyContext};
use credgate::server::{create_router, AppState};

fn build_app(doc: &str) -> Router {
    let config = Arc::new(config::from_value(json5::from_str(doc).unwrap()).unwrap());
    let registry = Arc::new(PluginRegistry::build(&config).unwrap());
    create_router(AppState {
        ctx: ProxyContext::new(config),
        registry,
    })
}

fn github_app() -> Router {
    build_app(
        r#"{ plugins: { github: { credentials: [
            { token: "tok_acme_0001", resources: ["acme/*"] },
            { token: "tok_any_0002", resources: ["*"] },
        ] } } }"#,
    )
}

async fn post_cli(app: Router, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/cli")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health_returns_ok() {
    let response = github_app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["status"], "ok");
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let request = Request::builder()
        .method("POST")
        .uri("/cli")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = github_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["error"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_missing_tool_is_bad_request() {
    let (status, body) = post_cli(
        github_app(),
        json!({ "args": ["pr", "list"], "resource": "acme/widgets" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_missing_resource_is_bad_request() {
    let (status, body) = post_cli(github_app(), json!({ "tool": "gh", "args": [] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_empty_tool_is_bad_request() {
    let (status, _) = post_cli(
        github_app(),
        json!({ "tool": "", "args": [], "resource": "acme/widgets" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_non_string_args_are_bad_request() {
    let (status, _) = post_cli(
        github_app(),
        json!({ "tool": "gh", "args": [1, 2], "resource": "acme/widgets" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_tool_rejected() {
    let (status, body) = post_cli(
        github_app(),
        json!({ "tool": "kubectl", "args": [], "resource": "acme/widgets" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "UNKNOWN_TOOL");
    assert!(body["message"].as_str().unwrap().contains("kubectl"));
}

#[tokio::test]
async fn test_no_credential_rejected() {
    let app = build_app(
        r#"{ plugins: { github: { credentials: [
            { token: "tok_scoped", resources: ["acme/*"] },
        ] } } }"#,
    );
    let (status, body) = post_cli(
        app,
        json!({ "tool": "gh", "args": ["pr", "list"], "resource": "other/widgets" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "NO_CREDENTIAL");
    // The rejection names the resource, never the configured secrets.
    assert!(!body.to_string().contains("tok_scoped"));
}

#[tokio::test]
async fn test_dispatch_succeeds_even_when_binary_missing() {
    // gh is not installed in the test environment: dispatch itself is fine
    // (HTTP 200) and the miss is reported in-band.
    let (status, body) = post_cli(
        github_app(),
        json!({ "tool": "gh", "args": ["pr", "list"], "resource": "acme/widgets" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["exit_code"], -1);
    assert_eq!(body["stderr"], "Command not found: gh");
}

#[tokio::test]
async fn test_custom_command_short_circuits_subprocess() {
    // `discussion` with no subcommand fails inside the handler; were it to
    // fall through, the missing gh binary would answer instead.
    let (status, body) = post_cli(
        github_app(),
        json!({ "tool": "gh", "args": ["discussion"], "resource": "acme/widgets" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["exit_code"], 1);
    assert_eq!(body["stderr"], "discussion subcommand required");
}

#[tokio::test]
async fn test_sub_issue_command_short_circuits_subprocess() {
    let (status, body) = post_cli(
        github_app(),
        json!({ "tool": "gh", "args": ["sub-issue", "bogus"], "resource": "acme/widgets" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["exit_code"], 1);
    assert_eq!(body["stderr"], "Unknown sub-issue subcommand: bogus");
}

#[tokio::test]
async fn test_declined_command_falls_through_to_subprocess() {
    // A plain `issue list` is not intercepted; it reaches the (missing) CLI.
    let (status, body) = post_cli(
        github_app(),
        json!({ "tool": "gh", "args": ["issue", "list"], "resource": "acme/widgets" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stderr"], "Command not found: gh");
}

#[tokio::test]
async fn test_custom_command_requires_credential_first() {
    let app = build_app(
        r#"{ plugins: { github: { credentials: [
            { token: "tok_scoped", resources: ["acme/*"] },
        ] } } }"#,
    );
    let (status, body) = post_cli(
        app,
        json!({ "tool": "gh", "args": ["discussion", "list"], "resource": "other/repo" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "NO_CREDENTIAL");
}

#[tokio::test]
async fn test_google_tool_routes_to_google_plugin() {
    let app = build_app(
        r#"{ plugins: {
            github: { credentials: [ { token: "t", resources: ["*"] } ] },
            google: { credentials: [ { keyring_password: "pw", resources: ["default"] } ] },
        } }"#,
    );
    let (status, body) = post_cli(
        app,
        json!({ "tool": "gog", "args": ["calendar", "list"], "resource": "default" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stderr"], "Command not found: gog");
}

#[tokio::test]
async fn test_google_resource_without_match_rejected() {
    let app = build_app(
        r#"{ plugins: {
            google: { credentials: [ { keyring_password: "pw", resources: ["default"] } ] },
        } }"#,
    );
    let (status, body) = post_cli(
        app,
        json!({ "tool": "gog", "args": [], "resource": "other-account" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "NO_CREDENTIAL");
}
