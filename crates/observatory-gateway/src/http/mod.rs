pub mod analyze;
pub mod health;

use axum::http::HeaderMap;

/// Extracts the bearer token from `Authorization: Bearer <token>`.
pub(crate) fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}
