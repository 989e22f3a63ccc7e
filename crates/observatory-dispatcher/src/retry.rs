//! Exponential backoff with jitter: base 1s, factor 2, jitter ±25%, up to
//! `max_retries`.

use std::time::Duration;

use rand::Rng;

pub struct Backoff {
    base: Duration,
    factor: f64,
    max_retries: u32,
}

impl Backoff {
    pub fn new(base: Duration, factor: f64, max_retries: u32) -> Self {
        Self { base, factor, max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before attempt `attempt` (1-indexed retry count), with ±25%
    /// jitter applied.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let raw = self.base.as_secs_f64() * self.factor.powi(attempt.saturating_sub(1) as i32);
        let jitter_frac = rand::thread_rng().gen_range(-0.25..=0.25);
        let jittered = (raw * (1.0 + jitter_frac)).max(0.0);
        Duration::from_secs_f64(jittered)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 2.0, 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_with_attempt_within_jitter_bounds() {
        let backoff = Backoff::new(Duration::from_secs(1), 2.0, 3);
        for attempt in 1..=3 {
            let d = backoff.delay_for(attempt);
            let expected = 2f64.powi(attempt as i32 - 1);
            assert!(d.as_secs_f64() <= expected * 1.25 + 0.01);
            assert!(d.as_secs_f64() >= (expected * 0.75 - 0.01).max(0.0));
        }
    }
}
