use std::str::FromStr;

use observatory_core::{JobId, JobStatus};
use rusqlite::{Result as SqlResult, Row};

use crate::types::{AnalysisOptions, AnalysisResult, Job, JobErrorDetail};

const JOB_COLUMNS: &str = "id, owner_fingerprint, status, conversation_text, options, \
    result, error, created_at, started_at, finished_at, expires_at, cancel_requested";

pub(crate) fn select_prefix() -> String {
    format!("SELECT {JOB_COLUMNS} FROM jobs")
}

/// Map a SELECT row (column order from `JOB_COLUMNS`) into a `Job`.
/// Centralised here, matching every `row_to_*` function across the
/// workspace's db layers.
pub(crate) fn row_to_job(row: &Row<'_>) -> SqlResult<Job> {
    let status_str: String = row.get(2)?;
    let status = JobStatus::from_str(&status_str).unwrap_or(JobStatus::Failed);

    let options_json: String = row.get(4)?;
    let options: AnalysisOptions = serde_json::from_str(&options_json).unwrap_or_default();

    let result_json: Option<String> = row.get(5)?;
    let result: Option<AnalysisResult> = result_json
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok());

    let error_json: Option<String> = row.get(6)?;
    let error: Option<JobErrorDetail> = error_json
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok());

    Ok(Job {
        id: JobId::from(row.get::<_, String>(0)?),
        owner_fingerprint: row.get(1)?,
        status,
        conversation_text: row.get(3)?,
        options,
        result,
        error,
        created_at: row.get(7)?,
        started_at: row.get(8)?,
        finished_at: row.get(9)?,
        expires_at: row.get(10)?,
        cancel_requested: row.get::<_, i64>(11)? != 0,
    })
}

/// Initialise the jobs table and its indexes. Idempotent — safe on every
/// startup. `STRICT` rejects type-mismatched inserts at the SQLite layer.
pub fn init_db(conn: &rusqlite::Connection) -> SqlResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS jobs (
            id                  TEXT PRIMARY KEY NOT NULL,
            owner_fingerprint   TEXT NOT NULL,
            status              TEXT NOT NULL DEFAULT 'pending',
            conversation_text   TEXT NOT NULL,
            options             TEXT NOT NULL DEFAULT '{}',
            result              TEXT,
            error               TEXT,
            created_at          TEXT NOT NULL,
            started_at          TEXT,
            finished_at         TEXT,
            expires_at          TEXT NOT NULL,
            cancel_requested    INTEGER NOT NULL DEFAULT 0
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_jobs_owner_created
            ON jobs (owner_fingerprint, created_at);
        CREATE INDEX IF NOT EXISTS idx_jobs_expires
            ON jobs (expires_at);",
    )
}
