use observatory_core::Tier;
use serde::{Deserialize, Serialize};

/// Resolved identity returned to the caller — never the raw credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub fingerprint: String,
    pub tier: Tier,
    pub label: Option<String>,
}

/// Row shape of the `credentials` table.
#[derive(Debug, Clone)]
pub struct StoredCredential {
    pub fingerprint_hash: String,
    pub tier: Tier,
    pub active: bool,
    pub created_at: String,
    pub expires_at: Option<String>,
    pub last_used_at: String,
    pub label: Option<String>,
}
