//! HTTP handlers: the webhook dispatcher and the health endpoint.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State as AxumState,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing,
};
use serde_json::json;
use tracing::{info, warn};

use crate::SharedState;
use crate::deploy;
use crate::event::{InboundEvent, PushPayload};
use crate::matcher::matching_projects;
use crate::signature;

/// Builds the application router. The webhook path comes from the config
/// loaded at startup; changing it requires a restart, everything else in
/// the config is picked up per request.
pub fn router(state: SharedState) -> Router {
    let path = state.snapshot().webhook.path.clone();
    Router::new()
        .route(&path, routing::post(handle_webhook).fallback(not_found))
        .route("/health", routing::get(health))
        .fallback(not_found)
        .with_state(state)
}

/// Wrong path or wrong method, same answer.
async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

/// Handles the GitHub webhook POST request.
///
/// Each request walks Received → Authenticated → Parsed → Matched →
/// Dispatched in order, returning at the first failing precondition.
/// Matched deploys are launched without being awaited, so the response
/// goes out long before any deploy finishes.
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let event_kind = headers
        .get("X-GitHub-Event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let delivery = headers
        .get("X-GitHub-Delivery")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    info!(event = event_kind, delivery, "Incoming webhook request");

    // Reload the config so edits apply without a restart. One snapshot
    // serves the whole request.
    let snapshot = state.reload();

    // Authenticate the raw body before parsing anything out of it.
    if snapshot.webhook.secret.is_empty() {
        warn!("No webhook secret configured, accepting request unverified");
    } else {
        let signature_header = headers
            .get("X-Hub-Signature-256")
            .and_then(|v| v.to_str().ok());
        if !signature::verify(&snapshot.webhook.secret, &body, signature_header) {
            warn!(delivery, "Signature verification failed");
            return (StatusCode::UNAUTHORIZED, "Invalid signature".to_string());
        }
    }

    let payload: PushPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            info!("Could not parse JSON body: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid JSON".to_string());
        }
    };
    let event = InboundEvent::from_payload(event_kind, &payload);

    if event.kind == "ping" {
        info!("ping event");
        return (StatusCode::OK, "pong".to_string());
    }
    if !event.is_push() {
        info!(event = %event.kind, "Not a push event, ignoring");
        return (StatusCode::OK, "ignored".to_string());
    }

    let matches = matching_projects(&snapshot, &event);
    if matches.is_empty() {
        info!(
            repo = %event.repository,
            branch = event.branch(),
            "No matching projects"
        );
        return (StatusCode::OK, "no matching projects".to_string());
    }

    let matched = matches.len();
    for project in matches {
        let run = deploy::launch(&snapshot, project, &event, &state.reporter);
        info!(
            run = %run.id,
            project = %run.project,
            branch = event.branch(),
            "Deploy dispatched"
        );
    }

    (StatusCode::OK, format!("ok, matched={}", matched))
}

/// Returns process and configuration metadata for operators.
pub async fn health(AxumState(state): AxumState<SharedState>) -> impl IntoResponse {
    let snapshot = state.snapshot();
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "started_at": state.started_at,
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "projects": snapshot.projects.len(),
    }))
}
