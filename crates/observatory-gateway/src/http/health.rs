use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::app::AppState;
use crate::error::apply_rate_limit_headers;
use crate::http::extract_bearer;
use crate::lifecycle;

/// GET /health — unauthenticated (no credential required) but still
/// rate-limited at public tier (spec §6), so it goes through the same
/// `authenticate` admission sequence as every other route and carries the
/// same `X-RateLimit-*` headers. Reports the dispatch queue depth as a
/// proxy for backend health: a queue pinned at capacity for a tick likely
/// means the backend stopped draining it.
pub async fn health_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: axum::http::HeaderMap,
) -> impl IntoResponse {
    let network_id = peer.ip().to_string();
    let (_identity, decision) = match lifecycle::authenticate(&state, extract_bearer(&headers), &network_id) {
        Ok(ok) => ok,
        Err(err) => return err.into_response(),
    };

    let depth = state.dispatcher.queue().depth();
    let backend = if depth < state.config.dispatcher.queue_depth { "ok" } else { "degraded" };

    let mut response = Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": backend,
        "store": "ok",
        "queue_depth": depth,
    }))
    .into_response();
    apply_rate_limit_headers(response.headers_mut(), &decision);
    response
}
