//! Lifecycle Controller — the request-bound orchestrator that ties
//! credential resolution, rate limiting, validation, and the job store
//! together. HTTP handlers in `http::analyze` stay thin wrappers around
//! these operations rather than inlining the admission logic per route.

use std::sync::Arc;

use observatory_auth::Identity;
use observatory_core::{ErrorKind, JobId, JobStatus, Tier};
use observatory_jobs::{AnalysisOptions, Job, Priority};
use observatory_ratelimit::RateLimitDecision;

use crate::app::AppState;
use crate::error::ApiError;
use crate::url_allowlist;

const RECOGNIZED_PATTERN_TYPES: [&str; 3] = ["dialectic", "themes", "sentiment"];

pub struct SubmitPayload {
    pub conversation_text: String,
    pub pattern_types: Vec<String>,
    pub callback_url: Option<String>,
    pub priority: Option<String>,
}

/// Resolves the caller's identity then checks its rate-limit window.
/// Shared by every HTTP operation so the admission sequence (credential
/// resolution before rate limiting) never drifts between handlers.
pub fn authenticate(
    state: &AppState,
    presented: Option<&str>,
    network_id: &str,
) -> Result<(Identity, RateLimitDecision), ApiError> {
    let identity = state.auth.resolve(presented, network_id)?;
    if presented.is_some() {
        state.auth.touch(&identity.fingerprint);
    }
    let decision = check_rate_limit(state, &identity)?;
    Ok((identity, decision))
}

fn check_rate_limit(state: &AppState, identity: &Identity) -> Result<RateLimitDecision, ApiError> {
    match state.rate_limiter.check(&identity.fingerprint, identity.tier) {
        Ok(decision) if decision.allowed => Ok(decision),
        Ok(decision) => Err(ApiError::new(ErrorKind::RateLimited, "rate limit exceeded").with_rate_limit(decision)),
        Err(err) => {
            // Store errors fail-closed for public, fail-open for paid
            // tiers.
            tracing::error!(error = %err, tier = %identity.tier, "rate limiter store error");
            match identity.tier {
                Tier::Public => Err(ApiError::internal("rate limiter unavailable")),
                Tier::ApiKey | Tier::Partner => Ok(RateLimitDecision {
                    allowed: true,
                    limit: 0,
                    remaining: 0,
                    reset_at: 0,
                    retry_after: None,
                }),
            }
        }
    }
}

/// Validates a submission payload and turns it into the store's
/// `AnalysisOptions`. Unknown option keys are rejected at the HTTP
/// deserialization boundary, before this function ever runs.
pub fn validate_submission(
    state: &AppState,
    identity: &Identity,
    payload: SubmitPayload,
) -> Result<(String, AnalysisOptions), ApiError> {
    let text = payload.conversation_text;
    if text.is_empty() {
        return Err(ApiError::invalid_input("conversation_text must not be empty"));
    }
    if text.chars().count() > state.config.dispatcher.max_input_chars {
        return Err(ApiError::invalid_input(format!(
            "conversation_text exceeds the {}-character limit",
            state.config.dispatcher.max_input_chars
        )));
    }

    for pt in &payload.pattern_types {
        if !RECOGNIZED_PATTERN_TYPES.contains(&pt.as_str()) {
            return Err(ApiError::invalid_input(format!("unrecognized pattern_types entry: {pt}")));
        }
    }

    if let Some(url) = &payload.callback_url {
        let allowlist = match identity.tier {
            Tier::Public => &state.config.tiers.callback_url_allowlist_public,
            Tier::ApiKey => &state.config.tiers.callback_url_allowlist_api_key,
            Tier::Partner => &state.config.tiers.callback_url_allowlist_partner,
        };
        if !url_allowlist::is_allowed(url, allowlist) {
            return Err(ApiError::invalid_input("callback_url is not on the allowed scheme/host list"));
        }
    }

    // `priority: "high"` is restricted to the partner tier; other tiers
    // are silently downgraded rather than rejected, since it's advisory
    // rather than a hard contract (see DESIGN.md).
    let priority = match payload.priority.as_deref() {
        None | Some("normal") => Priority::Normal,
        Some("high") if identity.tier == Tier::Partner => Priority::High,
        Some("high") => Priority::Normal,
        Some(other) => return Err(ApiError::invalid_input(format!("unrecognized priority: {other}"))),
    };

    Ok((
        text,
        AnalysisOptions {
            pattern_types: payload.pattern_types,
            callback_url: payload.callback_url,
            priority,
        },
    ))
}

/// Creates and enqueues a validated job. Pre-checks queue depth before
/// persisting so a saturated queue never leaves an orphaned `pending` row
/// behind; the dispatcher's own `push` re-checks atomically and is the
/// final word on whether the job actually gets in.
pub fn submit(state: &Arc<AppState>, owner_fingerprint: &str, conversation_text: &str, options: AnalysisOptions) -> Result<Job, ApiError> {
    if state.dispatcher.queue().depth() >= state.config.dispatcher.queue_depth {
        return Err(ApiError::busy());
    }

    let job = state.jobs.create(owner_fingerprint, conversation_text, &options)?;

    if !state.dispatcher.enqueue(job.id.clone(), options.priority) {
        let _ = state.jobs.mark_cancelled(&job.id);
        return Err(ApiError::busy());
    }

    Ok(job)
}

/// Projected view of a job, shaped by the caller's authorization tier:
/// public-tier callers only ever see status/created_at/expires_at.
pub fn project(job: &Job, tier: Tier) -> serde_json::Value {
    let base = serde_json::json!({
        "id": job.id.as_str(),
        "status": job.status.as_db_str(),
        "created_at": job.created_at,
        "expires_at": job.expires_at,
    });

    if tier == Tier::Public {
        return base;
    }

    let mut full = base;
    full["result"] = serde_json::to_value(&job.result).unwrap_or(serde_json::Value::Null);
    full["error"] = serde_json::to_value(&job.error).unwrap_or(serde_json::Value::Null);
    full
}

pub fn get(state: &AppState, identity: &Identity, id: &JobId) -> Result<Job, ApiError> {
    Ok(state.jobs.get(id, Some(&identity.fingerprint))?)
}

/// Returns `(status, was_already_terminal)`. A cancel on an already
/// terminal job is reported to the HTTP layer as a conflict, while the
/// store itself treats the request as an idempotent no-op.
pub fn cancel(state: &AppState, identity: &Identity, id: &JobId) -> Result<(JobStatus, bool), ApiError> {
    let pre = state.jobs.get(id, Some(&identity.fingerprint))?;
    let was_terminal = pre.status.is_terminal();
    let status = state.jobs.request_cancel(id, &identity.fingerprint)?;
    Ok((status, was_terminal))
}

pub fn list(state: &AppState, identity: &Identity, before: Option<&str>, limit: u32) -> Result<Vec<Job>, ApiError> {
    if identity.tier == Tier::Public {
        return Err(ApiError::new(ErrorKind::Unauthorized, "listing requires an authenticated tier"));
    }
    Ok(state.jobs.list(&identity.fingerprint, before, limit)?)
}
