//! End-to-end tests for the webhook dispatcher, driving the real router.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use hookdeploy::config::Config;
use hookdeploy::{AppState, handlers, signature};
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use tempfile::NamedTempFile;
use tower::ServiceExt;

const SECRET: &str = "test-webhook-secret";

/// Keeps the config file alive for the app's lifetime; the handler
/// re-reads it on every request.
struct TestServer {
    app: Router,
    config_file: NamedTempFile,
}

fn server(config_json: &str) -> TestServer {
    let mut config_file = NamedTempFile::new().unwrap();
    config_file.write_all(config_json.as_bytes()).unwrap();
    let config = Config::load(config_file.path()).unwrap();
    let state = Arc::new(AppState::new(config_file.path().to_path_buf(), config));
    TestServer {
        app: handlers::router(state),
        config_file,
    }
}

fn config_with_project(script: &str, args: &[&str]) -> String {
    serde_json::json!({
        "webhook": { "path": "/github", "secret": SECRET },
        "projects": [{
            "name": "app",
            "repo": "org/app",
            "branch": "main",
            "deployScript": script,
            "deployArgs": args,
        }]
    })
    .to_string()
}

fn push_body(repo: &str, git_ref: &str) -> String {
    serde_json::json!({
        "ref": git_ref,
        "repository": { "full_name": repo },
        "after": "0123456789abcdef0123456789abcdef01234567",
    })
    .to_string()
}

fn request(path: &str, event: &str, body: &str, signature_header: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("X-GitHub-Event", event)
        .header("X-GitHub-Delivery", "delivery-1")
        .header("content-type", "application/json");
    if let Some(header) = signature_header {
        builder = builder.header("X-Hub-Signature-256", header);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn signed(path: &str, event: &str, body: &str) -> Request<Body> {
    let header =
        signature::format_signature_header(&signature::compute_signature(SECRET, body.as_bytes()));
    request(path, event, body, Some(header))
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn valid_push_is_accepted_before_deploy_finishes() {
    let server = server(&config_with_project("/bin/sh", &["-c", "sleep 2"]));
    let body = push_body("org/app", "refs/heads/main");

    let started = Instant::now();
    let response = server
        .app
        .clone()
        .oneshot(signed("/github", "push", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok, matched=1");
    assert!(
        started.elapsed().as_millis() < 1000,
        "response must not wait for the deploy process"
    );
}

#[tokio::test]
async fn ping_is_answered_without_matching() {
    let server = server(&config_with_project("/bin/true", &[]));
    let body = push_body("org/app", "refs/heads/main");

    let response = server
        .app
        .clone()
        .oneshot(signed("/github", "ping", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "pong");
}

#[tokio::test]
async fn non_push_event_is_acknowledged_and_ignored() {
    let server = server(&config_with_project("/bin/true", &[]));
    let body = push_body("org/app", "refs/heads/main");

    let response = server
        .app
        .clone()
        .oneshot(signed("/github", "issues", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ignored");
}

#[tokio::test]
async fn bad_signature_is_unauthorized() {
    let server = server(&config_with_project("/bin/true", &[]));
    let body = push_body("org/app", "refs/heads/main");
    let tampered =
        signature::format_signature_header(&signature::compute_signature("other", body.as_bytes()));

    let response = server
        .app
        .clone()
        .oneshot(request("/github", "push", &body, Some(tampered)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_text(response).await, "Invalid signature");
}

#[tokio::test]
async fn missing_signature_is_unauthorized() {
    let server = server(&config_with_project("/bin/true", &[]));
    let body = push_body("org/app", "refs/heads/main");

    let response = server
        .app
        .clone()
        .oneshot(request("/github", "push", &body, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_json_is_bad_request() {
    let server = server(&config_with_project("/bin/true", &[]));
    let body = "this is not json";

    let response = server
        .app
        .clone()
        .oneshot(signed("/github", "push", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "Invalid JSON");
}

#[tokio::test]
async fn signature_checked_before_body_is_parsed() {
    let server = server(&config_with_project("/bin/true", &[]));

    // Invalid JSON with a bad signature: authentication fails first.
    let response = server
        .app
        .clone()
        .oneshot(request("/github", "push", "not json", Some("sha256=00".into())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unmatched_repository_is_acknowledged() {
    let server = server(&config_with_project("/bin/true", &[]));
    let body = push_body("org/other", "refs/heads/main");

    let response = server
        .app
        .clone()
        .oneshot(signed("/github", "push", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "no matching projects");
}

#[tokio::test]
async fn unmatched_branch_is_acknowledged() {
    let server = server(&config_with_project("/bin/true", &[]));
    let body = push_body("org/app", "refs/heads/dev");

    let response = server
        .app
        .clone()
        .oneshot(signed("/github", "push", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "no matching projects");
}

#[tokio::test]
async fn wrong_path_is_not_found() {
    let server = server(&config_with_project("/bin/true", &[]));
    let body = push_body("org/app", "refs/heads/main");

    let response = server
        .app
        .clone()
        .oneshot(signed("/other", "push", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn wrong_method_is_not_found() {
    let server = server(&config_with_project("/bin/true", &[]));

    let response = server
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/github")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn empty_secret_accepts_unsigned_requests() {
    let config = serde_json::json!({
        "webhook": { "path": "/github", "secret": "" },
        "projects": [{
            "name": "app",
            "repo": "org/app",
            "deployScript": "/bin/true",
        }]
    })
    .to_string();
    let server = server(&config);
    let body = push_body("org/app", "refs/heads/anything");

    let response = server
        .app
        .clone()
        .oneshot(request("/github", "push", &body, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok, matched=1");
}

#[tokio::test]
async fn config_edits_apply_without_restart() {
    let server = server(&config_with_project("/bin/true", &[]));
    let body = push_body("org/new-app", "refs/heads/main");

    let response = server
        .app
        .clone()
        .oneshot(signed("/github", "push", &body))
        .await
        .unwrap();
    assert_eq!(body_text(response).await, "no matching projects");

    // Point the same config file at the new repository.
    let updated = serde_json::json!({
        "webhook": { "path": "/github", "secret": SECRET },
        "projects": [{
            "name": "new-app",
            "repo": "org/new-app",
            "deployScript": "/bin/true",
        }]
    })
    .to_string();
    std::fs::write(server.config_file.path(), updated).unwrap();

    let response = server
        .app
        .clone()
        .oneshot(signed("/github", "push", &body))
        .await
        .unwrap();
    assert_eq!(body_text(response).await, "ok, matched=1");
}

#[tokio::test]
async fn broken_config_edit_keeps_previous_snapshot() {
    let server = server(&config_with_project("/bin/true", &[]));
    let body = push_body("org/app", "refs/heads/main");

    std::fs::write(server.config_file.path(), "{ not valid json").unwrap();

    // The stale-but-valid snapshot still serves the request.
    let response = server
        .app
        .clone()
        .oneshot(signed("/github", "push", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok, matched=1");
}

#[tokio::test]
async fn health_reports_process_metadata() {
    let server = server(&config_with_project("/bin/true", &[]));

    let response = server
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["name"], "hookdeploy");
    assert_eq!(json["projects"], 1);
}
