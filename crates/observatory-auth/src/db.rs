use std::str::FromStr;

use observatory_core::Tier;
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};

use crate::types::StoredCredential;

/// Map a SELECT row (column order from `CREDENTIAL_COLUMNS`) into a
/// `StoredCredential`. Centralised here so every query in this crate
/// stays consistent.
pub(crate) fn row_to_credential(row: &rusqlite::Row<'_>) -> SqlResult<StoredCredential> {
    let tier_str: String = row.get(1)?;
    let tier = Tier::from_str(&tier_str).unwrap_or(Tier::Public);
    Ok(StoredCredential {
        fingerprint_hash: row.get(0)?,
        tier,
        active: row.get::<_, i64>(2)? != 0,
        created_at: row.get(3)?,
        expires_at: row.get(4)?,
        last_used_at: row.get(5)?,
        label: row.get(6)?,
    })
}

const CREDENTIAL_COLUMNS: &str =
    "fingerprint_hash, tier, active, created_at, expires_at, last_used_at, label";

/// Initialise the credentials table. Safe to call on every startup —
/// `CREATE IF NOT EXISTS` means it's idempotent.
pub fn init_db(conn: &Connection) -> SqlResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS credentials (
            fingerprint_hash TEXT PRIMARY KEY NOT NULL,
            tier             TEXT NOT NULL DEFAULT 'public',
            active           INTEGER NOT NULL DEFAULT 1,
            created_at       TEXT NOT NULL,
            expires_at       TEXT,
            last_used_at     TEXT NOT NULL,
            label            TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_credentials_fingerprint
            ON credentials (fingerprint_hash);",
    )
}

pub fn find_by_hash(conn: &Connection, hash: &str) -> SqlResult<Option<StoredCredential>> {
    conn.query_row(
        &format!("SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE fingerprint_hash = ?1"),
        params![hash],
        row_to_credential,
    )
    .optional()
}

/// Best-effort usage touch: bumps `last_used_at`. Failures are logged and
/// swallowed by the caller.
pub fn touch(conn: &Connection, hash: &str, now: &str) -> SqlResult<()> {
    conn.execute(
        "UPDATE credentials SET last_used_at = ?2 WHERE fingerprint_hash = ?1",
        params![hash, now],
    )?;
    Ok(())
}
