pub mod error;
pub mod limiter;
pub mod types;

pub use error::{RateLimitError, Result};
pub use limiter::{DashMapStore, RateLimitStore, RateLimiter, TierWindowLimits};
pub use types::{RateLimitDecision, Window};
