//! Uniform HTTP error body (spec §7): `{error: {kind, message, details?}}`.
//! Every synchronous failure path in this crate converts into an
//! `ApiError`, which carries its own status code derived from
//! `ErrorKind::status_code`.

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use observatory_core::ErrorKind;
use observatory_ratelimit::RateLimitDecision;
use serde_json::json;

pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub retry_after: Option<i64>,
    pub rate_limit: Option<RateLimitDecision>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), details: None, retry_after: None, rate_limit: None }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_retry_after(mut self, secs: i64) -> Self {
        self.retry_after = Some(secs);
        self
    }

    /// Attaches the rate-limit decision so `X-RateLimit-*` headers are set
    /// on this error response too (spec §6: "headers on every response").
    pub fn with_rate_limit(mut self, decision: RateLimitDecision) -> Self {
        if let Some(retry_after) = decision.retry_after {
            self.retry_after = Some(retry_after);
        }
        self.rate_limit = Some(decision);
        self
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn invalid_credential(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidCredential, message)
    }

    pub fn not_found() -> Self {
        Self::new(ErrorKind::NotFound, "not found")
    }

    /// Fixed short retry hint for queue saturation; callers should back
    /// off and retry rather than treat this as a hard failure.
    pub fn busy() -> Self {
        Self::new(ErrorKind::Busy, "dispatch queue is saturated, try again shortly").with_retry_after(1)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

/// Inserts `X-RateLimit-Limit/Remaining/Reset` into `headers` from a
/// decision. Shared by the error path and every successful handler so the
/// header set never drifts between the two.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert("X-RateLimit-Limit", decision.limit.to_string().parse().unwrap());
    headers.insert("X-RateLimit-Remaining", decision.remaining.to_string().parse().unwrap());
    headers.insert("X-RateLimit-Reset", decision.reset_at.to_string().parse().unwrap());
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.kind.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut body = json!({
            "error": {
                "kind": self.kind.as_str(),
                "message": self.message,
                "details": self.details,
            }
        });
        if let Some(retry_after) = self.retry_after {
            body["error"]["retry_after"] = json!(retry_after);
        }
        let mut response = (status, Json(body)).into_response();
        if let Some(retry_after) = self.retry_after {
            response
                .headers_mut()
                .insert("Retry-After", retry_after.to_string().parse().unwrap());
        }
        if let Some(decision) = &self.rate_limit {
            apply_rate_limit_headers(response.headers_mut(), decision);
        }
        response
    }
}

impl From<observatory_auth::AuthError> for ApiError {
    fn from(err: observatory_auth::AuthError) -> Self {
        match err {
            observatory_auth::AuthError::Database(_) => ApiError::internal("credential lookup failed"),
            other => ApiError::invalid_credential(other.to_string()),
        }
    }
}

impl From<observatory_jobs::JobStoreError> for ApiError {
    fn from(err: observatory_jobs::JobStoreError) -> Self {
        match err {
            observatory_jobs::JobStoreError::NotFound => ApiError::not_found(),
            other => ApiError::internal(other.to_string()),
        }
    }
}
