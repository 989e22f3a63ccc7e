use serde::{Deserialize, Serialize};

/// A fixed-width accounting interval. One bucket exists per
/// `(identity, tier, window, bucket_start)` tuple (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Window {
    Minute,
    Hour,
    Day,
}

impl Window {
    pub fn seconds(self) -> i64 {
        match self {
            Window::Minute => 60,
            Window::Hour => 3_600,
            Window::Day => 86_400,
        }
    }

    pub fn all() -> [Window; 3] {
        [Window::Minute, Window::Hour, Window::Day]
    }
}

/// Outcome of a `RateLimiter::check` call. On denial, carries the
/// most-restrictive window's metadata (spec §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: i64,
    pub retry_after: Option<i64>,
}
