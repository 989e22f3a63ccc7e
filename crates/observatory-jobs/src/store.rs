//! Job Store.
//!
//! Durable storage of jobs with atomic transitions, owner-scoped queries,
//! and TTL-bounded retention. Status is never written directly by callers —
//! every transition is a named operation guarded by a `WHERE status = ?`
//! clause so the database itself arbitrates races between workers.

use std::sync::{Arc, Mutex};

use observatory_core::{time, JobId, JobStatus};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::instrument;

use crate::db;
use crate::error::{JobStoreError, Result};
use crate::types::{AnalysisOptions, AnalysisResult, Job, JobErrorDetail};

pub struct JobStore {
    conn: Arc<Mutex<Connection>>,
    pending_ttl_secs: i64,
    result_ttl_secs: i64,
    cancelled_ttl_secs: i64,
}

impl JobStore {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        pending_ttl_secs: i64,
        result_ttl_secs: i64,
        cancelled_ttl_secs: i64,
    ) -> Self {
        Self { conn, pending_ttl_secs, result_ttl_secs, cancelled_ttl_secs }
    }

    /// Assigns an id, persists with `status = pending`,
    /// `expires_at = now + pending_ttl`.
    #[instrument(skip(self, conversation_text, options))]
    pub fn create(&self, owner_fingerprint: &str, conversation_text: &str, options: &AnalysisOptions) -> Result<Job> {
        let id = JobId::new();
        let now = time::now();
        let now_str = now.to_rfc3339();
        let expires_at = time::plus_seconds(now, self.pending_ttl_secs).to_rfc3339();
        let options_json = serde_json::to_string(options).expect("AnalysisOptions always serializes");

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO jobs (id, owner_fingerprint, status, conversation_text, options,
                                created_at, expires_at, cancel_requested)
             VALUES (?1, ?2, 'pending', ?3, ?4, ?5, ?6, 0)",
            params![id.as_str(), owner_fingerprint, conversation_text, options_json, now_str, expires_at],
        )?;

        Ok(Job {
            id,
            owner_fingerprint: owner_fingerprint.to_string(),
            status: JobStatus::Pending,
            conversation_text: conversation_text.to_string(),
            options: options.clone(),
            result: None,
            error: None,
            created_at: now_str,
            started_at: None,
            finished_at: None,
            expires_at,
            cancel_requested: false,
        })
    }

    /// Atomic `pending -> running`. Returns `true` only if this call
    /// performed the transition — losers of a race observe `false` and
    /// abandon silently.
    #[instrument(skip(self))]
    pub fn claim(&self, id: &JobId) -> Result<bool> {
        let now = time::now_rfc3339();
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE jobs SET status = 'running', started_at = ?2
             WHERE id = ?1 AND status = 'pending'",
            params![id.as_str(), now],
        )?;
        Ok(rows == 1)
    }

    /// Atomic `running -> completed`.
    #[instrument(skip(self, result))]
    pub fn complete(&self, id: &JobId, result: &AnalysisResult) -> Result<()> {
        let now = time::now();
        let expires_at = time::plus_seconds(now, self.result_ttl_secs).to_rfc3339();
        let result_json = serde_json::to_string(result).expect("AnalysisResult always serializes");

        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE jobs SET status = 'completed', result = ?2, finished_at = ?3, expires_at = ?4
             WHERE id = ?1 AND status = 'running'",
            params![id.as_str(), result_json, now.to_rfc3339(), expires_at],
        )?;
        if rows != 1 {
            return Err(JobStoreError::InvalidState);
        }
        Ok(())
    }

    /// Atomic `running -> failed`.
    #[instrument(skip(self, error))]
    pub fn fail(&self, id: &JobId, error: &JobErrorDetail) -> Result<()> {
        let now = time::now();
        let expires_at = time::plus_seconds(now, self.result_ttl_secs).to_rfc3339();
        let error_json = serde_json::to_string(error).expect("JobErrorDetail always serializes");

        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE jobs SET status = 'failed', error = ?2, finished_at = ?3, expires_at = ?4
             WHERE id = ?1 AND status = 'running'",
            params![id.as_str(), error_json, now.to_rfc3339(), expires_at],
        )?;
        if rows != 1 {
            return Err(JobStoreError::InvalidState);
        }
        Ok(())
    }

    /// Sets `cancel_requested = true` if the caller owns the job and its
    /// status is non-terminal; returns the post-operation status, which
    /// may still be `pending`/`running` until the dispatcher observes the
    /// latch. Idempotent: a second call on an already-latched job is a
    /// no-op that returns the same status.
    #[instrument(skip(self))]
    pub fn request_cancel(&self, id: &JobId, owner_fingerprint: &str) -> Result<JobStatus> {
        let job = self.get(id, Some(owner_fingerprint))?;
        if job.status.is_terminal() {
            return Ok(job.status);
        }
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE jobs SET cancel_requested = 1
             WHERE id = ?1 AND owner_fingerprint = ?2 AND status IN ('pending', 'running')",
            params![id.as_str(), owner_fingerprint],
        )?;
        Ok(job.status)
    }

    /// Dispatcher-side transition when the cancel latch is observed.
    /// Also scrubs `conversation_text` (Open Question 2, resolved:
    /// scrub on cancel) in the same statement.
    #[instrument(skip(self))]
    pub fn mark_cancelled(&self, id: &JobId) -> Result<()> {
        let now = time::now();
        let expires_at = time::plus_seconds(now, self.cancelled_ttl_secs).to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE jobs SET status = 'cancelled', conversation_text = '', finished_at = ?2, expires_at = ?3
             WHERE id = ?1 AND status IN ('pending', 'running')",
            params![id.as_str(), now.to_rfc3339(), expires_at],
        )?;
        Ok(())
    }

    /// Returns the job if `owner_fingerprint` matches, or if it is
    /// `None` (admin path). Fails `not_found` otherwise — existence is
    /// never leaked to a non-owner.
    #[instrument(skip(self))]
    pub fn get(&self, id: &JobId, owner_fingerprint: Option<&str>) -> Result<Job> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("{} WHERE id = ?1", db::select_prefix());
        let job: Job = conn
            .query_row(&sql, params![id.as_str()], db::row_to_job)
            .optional()?
            .ok_or(JobStoreError::NotFound)?;

        if let Some(owner) = owner_fingerprint {
            if job.owner_fingerprint != owner {
                return Err(JobStoreError::NotFound);
            }
        }
        Ok(job)
    }

    /// Paginated listing, authenticated callers only (enforced by the
    /// Lifecycle Controller, not here), ordered `created_at desc`.
    #[instrument(skip(self))]
    pub fn list(&self, owner_fingerprint: &str, before: Option<&str>, limit: u32) -> Result<Vec<Job>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "{} WHERE owner_fingerprint = ?1 AND (?2 IS NULL OR created_at < ?2)
             ORDER BY created_at DESC LIMIT ?3",
            db::select_prefix()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![owner_fingerprint, before, limit], db::row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Deletes rows past their `expires_at`, and transitions stale
    /// `pending`/`running` rows past `created_at + pending_ttl` to
    /// `failed{kind=timeout}`. Idempotent: calling twice in a row with
    /// the same `now` leaves the store in the same state as one call.
    ///
    /// Due rows are collected into a `Vec` before mutating — the same
    /// hazard `SchedulerEngine::tick` avoids, since a borrowed
    /// `Statement` cannot be held across a later `execute` on the same
    /// connection.
    #[instrument(skip(self))]
    pub fn reap(&self, now_str: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();

        let stale_ids: Vec<String> = {
            let mut stmt = conn.prepare(
                "SELECT id FROM jobs
                 WHERE status IN ('pending', 'running') AND expires_at <= ?1",
            )?;
            stmt.query_map(params![now_str], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };

        // Recompute expires_at against result_ttl so a timed-out job ages
        // out normally afterward instead of being deleted in this same
        // pass, since its old expires_at (== created_at + pending_ttl)
        // already equals `now_str` by construction.
        let now = time::parse_rfc3339(now_str).unwrap_or_else(time::now);
        let new_expires_at = time::plus_seconds(now, self.result_ttl_secs).to_rfc3339();

        for id in &stale_ids {
            conn.execute(
                "UPDATE jobs SET status = 'failed',
                    error = '{\"kind\":\"timeout\",\"message\":\"pending_ttl exceeded\"}',
                    finished_at = ?2, expires_at = ?3
                 WHERE id = ?1 AND status IN ('pending', 'running')",
                params![id, now_str, new_expires_at],
            )?;
        }

        let deleted = conn.execute("DELETE FROM jobs WHERE expires_at <= ?1", params![now_str])?;

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> JobStore {
        let conn = Connection::open_in_memory().unwrap();
        db::init_db(&conn).unwrap();
        JobStore::new(Arc::new(Mutex::new(conn)), 300, 2_592_000, 86_400)
    }

    fn dummy_result() -> AnalysisResult {
        AnalysisResult {
            patterns: vec![],
            themes: vec!["greeting".into()],
            sentiment: crate::types::Sentiment { polarity: 0.5, intensity: 0.2 },
            processing_seconds: 0.01,
            model_identifier: "test-model@prompt-v1".into(),
            coerced: false,
        }
    }

    #[test]
    fn create_then_get_round_trips() {
        let store = store();
        let job = store.create("fp1", "hello", &AnalysisOptions::default()).unwrap();
        let fetched = store.get(&job.id, Some("fp1")).unwrap();
        assert_eq!(fetched.status, JobStatus::Pending);
    }

    #[test]
    fn claim_succeeds_once() {
        let store = store();
        let job = store.create("fp1", "hello", &AnalysisOptions::default()).unwrap();
        assert!(store.claim(&job.id).unwrap());
        assert!(!store.claim(&job.id).unwrap());
    }

    #[test]
    fn complete_requires_running() {
        let store = store();
        let job = store.create("fp1", "hello", &AnalysisOptions::default()).unwrap();
        assert!(store.complete(&job.id, &dummy_result()).is_err());
        store.claim(&job.id).unwrap();
        store.complete(&job.id, &dummy_result()).unwrap();
        let fetched = store.get(&job.id, Some("fp1")).unwrap();
        assert_eq!(fetched.status, JobStatus::Completed);
        assert!(fetched.result.is_some());
    }

    #[test]
    fn cross_owner_get_is_not_found() {
        let store = store();
        let job = store.create("fp1", "hello", &AnalysisOptions::default()).unwrap();
        let err = store.get(&job.id, Some("fp2")).unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn cancel_is_idempotent() {
        let store = store();
        let job = store.create("fp1", "hello", &AnalysisOptions::default()).unwrap();
        let first = store.request_cancel(&job.id, "fp1").unwrap();
        let second = store.request_cancel(&job.id, "fp1").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn mark_cancelled_scrubs_text() {
        let store = store();
        let job = store.create("fp1", "secret conversation", &AnalysisOptions::default()).unwrap();
        store.request_cancel(&job.id, "fp1").unwrap();
        store.mark_cancelled(&job.id).unwrap();
        let fetched = store.get(&job.id, Some("fp1")).unwrap();
        assert_eq!(fetched.status, JobStatus::Cancelled);
        assert_eq!(fetched.conversation_text, "");
    }

    #[test]
    fn reap_is_idempotent() {
        let store = store();
        let job = store.create("fp1", "hello", &AnalysisOptions::default()).unwrap();
        store.claim(&job.id).unwrap();
        store.complete(&job.id, &dummy_result()).unwrap();

        // Force past expiry by reaping with a far-future timestamp.
        let far_future = time::plus_seconds(time::now(), 10_000_000).to_rfc3339();
        store.reap(&far_future).unwrap();
        let after_first = store.get(&job.id, Some("fp1"));
        assert!(after_first.is_err());

        // Second reap with the same horizon changes nothing further.
        store.reap(&far_future).unwrap();
        let after_second = store.get(&job.id, Some("fp1"));
        assert!(after_second.is_err());
    }

    #[test]
    fn pending_past_ttl_times_out_without_being_deleted() {
        let store = store();
        let job = store.create("fp1", "hello", &AnalysisOptions::default()).unwrap();
        let past_ttl = time::plus_seconds(time::now(), 301).to_rfc3339();
        store.reap(&past_ttl).unwrap();

        let fetched = store.get(&job.id, Some("fp1")).unwrap();
        assert_eq!(fetched.status, JobStatus::Failed);
        assert_eq!(fetched.error.unwrap().kind, observatory_core::ErrorKind::Timeout);
    }
}
