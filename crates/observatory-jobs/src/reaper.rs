//! TTL reaper. A periodic timer task that sweeps expired and timed-out
//! jobs on a fixed tick, selecting against a shutdown signal so it can
//! stop cleanly.

use std::sync::Arc;
use std::time::Duration;

use observatory_core::time;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::store::JobStore;

pub struct Reaper {
    store: Arc<JobStore>,
    tick: Duration,
}

impl Reaper {
    pub fn new(store: Arc<JobStore>, tick_secs: u64) -> Self {
        Self { store, tick: Duration::from_secs(tick_secs) }
    }

    /// Runs until `shutdown` fires. A failed pass is logged and skipped;
    /// the next tick recovers, so a missed pass only extends retention by
    /// one tick rather than crashing the task.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.tick);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = time::now_rfc3339();
                    match self.store.reap(&now) {
                        Ok(deleted) if deleted > 0 => info!(deleted, "reaper pass complete"),
                        Ok(_) => {}
                        Err(err) => warn!(error = %err, "reaper pass failed"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("reaper shutting down");
                        break;
                    }
                }
            }
        }
    }
}
