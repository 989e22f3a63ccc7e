//! Rate Limiter.
//!
//! Fixed-window counters keyed by `(identity, tier, window, bucket_start)`,
//! held per-key in a concurrent map so counting never takes a global lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use observatory_core::{Tier, time};

use crate::error::Result;
use crate::types::{RateLimitDecision, Window};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    identity: String,
    window: Window,
}

struct Bucket {
    bucket_start: i64,
    count: AtomicU64,
}

/// Pluggable counter store. The single in-process implementation below
/// suffices for single-node correctness; a networked implementation (e.g.
/// Redis `INCR`/`EXPIRE`) would satisfy the same trait for the distributed
/// case.
pub trait RateLimitStore: Send + Sync {
    /// Atomically advance to the current window bucket (resetting the
    /// counter if the bucket has rolled over) and increment by one.
    /// Returns `(count_after_increment, bucket_start)`.
    fn increment(&self, identity: &str, window: Window, now: i64) -> Result<(u64, i64)>;
}

pub struct DashMapStore {
    buckets: DashMap<BucketKey, Bucket>,
}

impl DashMapStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            buckets: DashMap::new(),
        })
    }
}

impl Default for DashMapStore {
    fn default() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }
}

impl RateLimitStore for DashMapStore {
    fn increment(&self, identity: &str, window: Window, now: i64) -> Result<(u64, i64)> {
        let bucket_start = (now / window.seconds()) * window.seconds();
        let key = BucketKey {
            identity: identity.to_string(),
            window,
        };

        let mut entry = self.buckets.entry(key).or_insert_with(|| Bucket {
            bucket_start,
            count: AtomicU64::new(0),
        });

        if entry.bucket_start != bucket_start {
            entry.bucket_start = bucket_start;
            entry.count.store(0, Ordering::SeqCst);
        }

        let count = entry.count.fetch_add(1, Ordering::SeqCst) + 1;
        Ok((count, entry.bucket_start))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TierWindowLimits {
    pub per_minute: u64,
    pub per_hour: u64,
    pub per_day: u64,
}

impl TierWindowLimits {
    fn limit_for(&self, window: Window) -> u64 {
        match window {
            Window::Minute => self.per_minute,
            Window::Hour => self.per_hour,
            Window::Day => self.per_day,
        }
    }
}

pub struct RateLimiter<S: RateLimitStore> {
    store: Arc<S>,
    public: TierWindowLimits,
    api_key: TierWindowLimits,
    partner: TierWindowLimits,
}

impl<S: RateLimitStore> RateLimiter<S> {
    pub fn new(
        store: Arc<S>,
        public: TierWindowLimits,
        api_key: TierWindowLimits,
        partner: TierWindowLimits,
    ) -> Self {
        Self { store, public, api_key, partner }
    }

    fn limits_for(&self, tier: Tier) -> TierWindowLimits {
        match tier {
            Tier::Public => self.public,
            Tier::ApiKey => self.api_key,
            Tier::Partner => self.partner,
        }
    }

    /// Atomic across the three windows: a single call increments every
    /// window's bucket in one pass, then reports the most-restrictive
    /// (lowest remaining) window's metadata on denial. Because the
    /// increment already happened here, `observe` is intentionally a no-op
    /// in this implementation — see its doc comment.
    pub fn check(&self, identity: &str, tier: Tier) -> Result<RateLimitDecision> {
        let limits = self.limits_for(tier);
        let now = time::now().timestamp();

        let mut worst: Option<RateLimitDecision> = None;
        for window in Window::all() {
            let limit = limits.limit_for(window);
            let (count, bucket_start) = self.store.increment(identity, window, now)?;
            let reset_at = bucket_start + window.seconds();
            let remaining = limit.saturating_sub(count);
            let allowed = count <= limit;

            let decision = RateLimitDecision {
                allowed,
                limit,
                remaining,
                reset_at,
                retry_after: if allowed { None } else { Some(reset_at - now) },
            };

            worst = Some(match worst {
                None => decision,
                Some(prev) if !decision.allowed && (prev.allowed || decision.remaining < prev.remaining) => {
                    decision
                }
                Some(prev) => prev,
            });
        }

        Ok(worst.expect("Window::all() is non-empty"))
    }

    /// Post-success increment hook. `check` above already performs the
    /// atomic increment across all three windows in one pass, so this is a
    /// deliberate no-op to avoid double-counting a single request;
    /// callers that bypass `check` entirely (none in this codebase) would
    /// need a real increment here instead.
    pub fn observe(&self, _identity: &str, _tier: Tier) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(per_minute: u64) -> RateLimiter<DashMapStore> {
        let limits = TierWindowLimits { per_minute, per_hour: 1_000_000, per_day: 1_000_000 };
        RateLimiter::new(DashMapStore::new(), limits, limits, limits)
    }

    #[test]
    fn nth_request_allowed_n_plus_1th_denied() {
        let rl = limiter(10);
        for i in 1..=10 {
            let d = rl.check("caller", Tier::Public).unwrap();
            assert!(d.allowed, "request {i} should be allowed");
        }
        let d = rl.check("caller", Tier::Public).unwrap();
        assert!(!d.allowed);
        assert_eq!(d.remaining, 0);
        assert!(d.retry_after.unwrap() <= 60);
    }

    #[test]
    fn distinct_identities_have_independent_buckets() {
        let rl = limiter(1);
        assert!(rl.check("a", Tier::Public).unwrap().allowed);
        assert!(rl.check("b", Tier::Public).unwrap().allowed);
        assert!(!rl.check("a", Tier::Public).unwrap().allowed);
    }

    #[test]
    fn denial_reports_most_restrictive_window() {
        let limits_minute_tight = TierWindowLimits { per_minute: 1, per_hour: 1000, per_day: 1000 };
        let rl = RateLimiter::new(DashMapStore::new(), limits_minute_tight, limits_minute_tight, limits_minute_tight);
        assert!(rl.check("a", Tier::Public).unwrap().allowed);
        let d = rl.check("a", Tier::Public).unwrap();
        assert!(!d.allowed);
        assert_eq!(d.limit, 1);
    }
}
