//! Central shared state, passed as `Arc<AppState>` to every Axum handler:
//! one struct, constructed once at startup, handed to `build_router`.

use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::routing::{get, post};
use axum::Router;
use observatory_auth::CredentialResolver;
use observatory_core::{ErrorKind, ObservatoryConfig, Tier};
use observatory_dispatcher::{CallbackSecretProvider, Dispatcher};
use observatory_jobs::JobStore;
use observatory_ratelimit::{DashMapStore, RateLimiter};
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;

pub type AppRateLimiter = RateLimiter<DashMapStore>;

pub struct AppState {
    pub config: ObservatoryConfig,
    pub auth: Arc<CredentialResolver>,
    pub rate_limiter: AppRateLimiter,
    pub jobs: Arc<JobStore>,
    pub dispatcher: Arc<Dispatcher>,
}

/// Resolves the per-tier callback HMAC secret from the gateway's own
/// config plus the shared Credential Resolver, implementing the trait the
/// dispatcher defines. Kept separate from `AppState` so it can be handed
/// to the `Dispatcher` before `AppState` itself exists (the dispatcher is
/// constructed first, the router second).
pub struct ConfigCallbackSecrets {
    auth: Arc<CredentialResolver>,
    public: String,
    api_key: String,
    partner: String,
}

impl ConfigCallbackSecrets {
    pub fn new(auth: Arc<CredentialResolver>, public: String, api_key: String, partner: String) -> Self {
        Self { auth, public, api_key, partner }
    }
}

impl CallbackSecretProvider for ConfigCallbackSecrets {
    fn secret_for(&self, owner_fingerprint: &str) -> String {
        match self.auth.tier_for_fingerprint(owner_fingerprint) {
            Tier::Public => self.public.clone(),
            Tier::ApiKey => self.api_key.clone(),
            Tier::Partner => self.partner.clone(),
        }
    }
}

/// Assemble the full Axum router. Every handler carries the server's
/// wall-clock request timeout (spec §5, default 30 s) as a `TimeoutLayer`;
/// `HandleErrorLayer` turns an expired request into this crate's own
/// `timeout` error body instead of tower's opaque `BoxError`.
pub fn build_router(state: Arc<AppState>) -> Router {
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/v1/analyze", post(crate::http::analyze::submit_handler))
        .route("/v1/analyze", get(crate::http::analyze::list_handler))
        .route("/v1/analyze/{id}", get(crate::http::analyze::get_handler))
        .route("/v1/analyze/{id}/cancel", post(crate::http::analyze::cancel_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_request_timeout))
                .layer(TimeoutLayer::new(request_timeout)),
        )
}

async fn handle_request_timeout(_err: tower::BoxError) -> ApiError {
    ApiError::new(ErrorKind::Timeout, "request exceeded the handler wall-clock timeout")
}
