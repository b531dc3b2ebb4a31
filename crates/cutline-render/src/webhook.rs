//! Status callback ingestion.
//!
//! A push channel for the executing render process: `POST
//! /internal/render/callback` with the shared secret in the
//! `x-render-secret` header. Requests with a missing or mismatched secret
//! are rejected before any state is touched; the comparison is constant
//! time.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tower_http::trace::TraceLayer;
use tracing::warn;

use cutline_models::{ApplyOutcome, CallbackPayload, JobId};

use crate::error::RenderJobError;
use crate::notify::SECRET_HEADER;
use crate::orchestrator::Orchestrator;

type HmacSha256 = Hmac<Sha256>;

/// State for the webhook router.
#[derive(Clone)]
pub struct WebhookState {
    pub orchestrator: Orchestrator,
    pub secret: String,
}

/// Build the callback router.
pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/internal/render/callback", post(ingest))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Constant-time shared-secret comparison.
///
/// Both values are run through HMAC-SHA256 keyed with the expected secret;
/// `verify_slice` compares the tags without early exit, so timing reveals
/// nothing about where the strings diverge.
pub fn verify_shared_secret(expected: &str, provided: &str) -> bool {
    let Ok(mut provided_mac) = HmacSha256::new_from_slice(expected.as_bytes()) else {
        return false;
    };
    provided_mac.update(provided.as_bytes());
    let provided_tag = provided_mac.finalize().into_bytes();

    let Ok(mut expected_mac) = HmacSha256::new_from_slice(expected.as_bytes()) else {
        return false;
    };
    expected_mac.update(expected.as_bytes());
    expected_mac.verify_slice(&provided_tag).is_ok()
}

async fn ingest(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    Json(payload): Json<CallbackPayload>,
) -> impl IntoResponse {
    let authorized = headers
        .get(SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|provided| verify_shared_secret(&state.secret, provided));
    if !authorized {
        warn!("callback rejected: bad or missing shared secret");
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "unauthorized"})),
        );
    }

    let job_id = JobId::from_string(&payload.job_id);
    match state
        .orchestrator
        .apply_status(&job_id, payload.into_update())
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(serde_json::json!({"applied": outcome == ApplyOutcome::Applied})),
        ),
        Err(RenderJobError::JobNotFound(id)) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": format!("job not found: {id}")})),
        ),
        Err(RenderJobError::InvalidTransition(reason)) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({"error": reason})),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
    }
}
