//! Bounded dispatch queue with a high-priority lane: `high`-priority
//! submissions jump the queue head ahead of `normal` ones. Implemented as
//! two `VecDeque`s behind a std `Mutex` plus a `Notify` so workers can
//! block without polling.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use observatory_core::JobId;
use observatory_jobs::Priority;
use tokio::sync::Notify;

pub struct DispatchQueue {
    high: Mutex<VecDeque<JobId>>,
    normal: Mutex<VecDeque<JobId>>,
    notify: Notify,
    depth: AtomicUsize,
    capacity: usize,
}

impl DispatchQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            high: Mutex::new(VecDeque::new()),
            normal: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            depth: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Enqueues `id`. Returns `false` (the caller maps this to `busy` /
    /// HTTP 503) when the queue is already at `capacity`.
    pub fn push(&self, id: JobId, priority: Priority) -> bool {
        if self.depth.load(Ordering::SeqCst) >= self.capacity {
            return false;
        }
        match priority {
            Priority::High => self.high.lock().unwrap().push_back(id),
            Priority::Normal => self.normal.lock().unwrap().push_back(id),
        }
        self.depth.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_one();
        true
    }

    /// Blocks until a job id is available, draining the high-priority
    /// lane first.
    pub async fn pop(&self) -> JobId {
        loop {
            if let Some(id) = self.high.lock().unwrap().pop_front() {
                self.depth.fetch_sub(1, Ordering::SeqCst);
                return id;
            }
            if let Some(id) = self.normal.lock().unwrap().pop_front() {
                self.depth.fetch_sub(1, Ordering::SeqCst);
                return id;
            }
            self.notify.notified().await;
        }
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn high_priority_drains_before_normal() {
        let q = DispatchQueue::new(10);
        q.push(JobId::from("normal-1"), Priority::Normal);
        q.push(JobId::from("high-1"), Priority::High);

        assert_eq!(q.pop().await.as_str(), "high-1");
        assert_eq!(q.pop().await.as_str(), "normal-1");
    }

    #[test]
    fn push_rejected_once_capacity_reached() {
        let q = DispatchQueue::new(1);
        assert!(q.push(JobId::from("a"), Priority::Normal));
        assert!(!q.push(JobId::from("b"), Priority::Normal));
    }
}
