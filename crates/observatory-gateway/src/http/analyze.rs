//! POST /v1/analyze, GET /v1/analyze/{id}, POST /v1/analyze/{id}/cancel,
//! GET /v1/analyze (spec §6). Handlers stay thin: parse the wire shape,
//! hand off to `lifecycle`, project the result back to JSON.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use observatory_core::JobId;

use crate::app::AppState;
use crate::error::{apply_rate_limit_headers, ApiError};
use crate::http::extract_bearer;
use crate::lifecycle::{self, SubmitPayload};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SubmitRequest {
    conversation_text: String,
    #[serde(default)]
    pattern_types: Vec<String>,
    #[serde(default)]
    callback_url: Option<String>,
    #[serde(default)]
    priority: Option<String>,
}

#[derive(Serialize)]
struct SubmitResponse {
    id: String,
    status: &'static str,
    expires_at: String,
}

/// POST /v1/analyze. Parses the body manually (not via the `Json`
/// extractor) so malformed or unknown-key payloads produce this crate's
/// own `invalid_input` error body rather than axum's default rejection
/// text (spec §7: every error uses the shared taxonomy).
pub async fn submit_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: axum::http::HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let network_id = peer.ip().to_string();
    let (identity, decision) = match lifecycle::authenticate(&state, extract_bearer(&headers), &network_id) {
        Ok(ok) => ok,
        Err(err) => return err.into_response(),
    };

    let req: SubmitRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(err) => {
            return ApiError::invalid_input(format!("malformed request body: {err}"))
                .with_rate_limit(decision.clone())
                .into_response()
        }
    };

    let (text, options) = match lifecycle::validate_submission(
        &state,
        &identity,
        SubmitPayload {
            conversation_text: req.conversation_text,
            pattern_types: req.pattern_types,
            callback_url: req.callback_url,
            priority: req.priority,
        },
    ) {
        Ok(ok) => ok,
        Err(err) => return err.with_rate_limit(decision.clone()).into_response(),
    };

    let job = match lifecycle::submit(&state, identity.fingerprint.as_str(), &text, options) {
        Ok(job) => job,
        Err(err) => return err.with_rate_limit(decision.clone()).into_response(),
    };

    let mut response = (
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            id: job.id.as_str().to_string(),
            status: job.status.as_db_str(),
            expires_at: job.expires_at,
        }),
    )
        .into_response();
    apply_rate_limit_headers(response.headers_mut(), &decision);
    response
}

/// GET /v1/analyze/{id}.
pub async fn get_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: axum::http::HeaderMap,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let network_id = peer.ip().to_string();
    let (identity, decision) = match lifecycle::authenticate(&state, extract_bearer(&headers), &network_id) {
        Ok(ok) => ok,
        Err(err) => return err.into_response(),
    };

    let job = match lifecycle::get(&state, &identity, &JobId::from(id)) {
        Ok(job) => job,
        Err(err) => return err.with_rate_limit(decision.clone()).into_response(),
    };

    let mut response = Json(lifecycle::project(&job, identity.tier)).into_response();
    apply_rate_limit_headers(response.headers_mut(), &decision);
    response
}

#[derive(Serialize)]
struct CancelResponse {
    id: String,
    status: &'static str,
}

/// POST /v1/analyze/{id}/cancel. `200` when the cancel latch was set (or
/// was already set — idempotent), `409` when the job had already reached
/// a terminal state before this call.
pub async fn cancel_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: axum::http::HeaderMap,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let network_id = peer.ip().to_string();
    let (identity, decision) = match lifecycle::authenticate(&state, extract_bearer(&headers), &network_id) {
        Ok(ok) => ok,
        Err(err) => return err.into_response(),
    };

    let (status, was_terminal) = match lifecycle::cancel(&state, &identity, &JobId::from(id.clone())) {
        Ok(ok) => ok,
        Err(err) => return err.with_rate_limit(decision.clone()).into_response(),
    };

    let code = if was_terminal { StatusCode::CONFLICT } else { StatusCode::OK };
    let mut response = (code, Json(CancelResponse { id, status: status.as_db_str() })).into_response();
    apply_rate_limit_headers(response.headers_mut(), &decision);
    response
}

#[derive(Deserialize)]
pub struct ListParams {
    cursor: Option<String>,
    limit: Option<u32>,
}

#[derive(Serialize)]
struct ListResponse {
    jobs: Vec<serde_json::Value>,
    next_cursor: Option<String>,
}

const DEFAULT_LIST_LIMIT: u32 = 50;
const MAX_LIST_LIMIT: u32 = 200;

/// GET /v1/analyze?cursor=&limit=. Restricted to authenticated tiers
/// (spec §4.5); the cursor is the hex-encoded `created_at` of the last
/// item on the previous page, reusing the `hex` crate already pulled in
/// for callback signatures rather than adding a `base64` dependency.
pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: axum::http::HeaderMap,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    let network_id = peer.ip().to_string();
    let (identity, decision) = match lifecycle::authenticate(&state, extract_bearer(&headers), &network_id) {
        Ok(ok) => ok,
        Err(err) => return err.into_response(),
    };

    let before = match params.cursor.as_deref().map(decode_cursor) {
        Some(Ok(before)) => Some(before),
        Some(Err(())) => {
            return ApiError::invalid_input("malformed cursor")
                .with_rate_limit(decision.clone())
                .into_response()
        }
        None => None,
    };
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);

    let jobs = match lifecycle::list(&state, &identity, before.as_deref(), limit) {
        Ok(jobs) => jobs,
        Err(err) => return err.with_rate_limit(decision.clone()).into_response(),
    };

    let next_cursor = if jobs.len() as u32 == limit {
        jobs.last().map(|job| encode_cursor(&job.created_at))
    } else {
        None
    };
    let projected = jobs.iter().map(|job| lifecycle::project(job, identity.tier)).collect();

    let mut response = Json(ListResponse { jobs: projected, next_cursor }).into_response();
    apply_rate_limit_headers(response.headers_mut(), &decision);
    response
}

fn encode_cursor(created_at: &str) -> String {
    hex::encode(created_at.as_bytes())
}

fn decode_cursor(cursor: &str) -> Result<String, ()> {
    let bytes = hex::decode(cursor).map_err(|_| ())?;
    String::from_utf8(bytes).map_err(|_| ())
}
