use sha2::{Digest, Sha256};

/// Fixed, fast, one-way hash for credential lookup (spec §4.1: "not a
/// password hash — lookup is per-request, so a constant-time table lookup
/// on the hash is appropriate"). Deliberately not argon2: a slow KDF here
/// would make every authenticated request pay a deliberate-slowdown tax.
pub fn fingerprint_hash(presented: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(presented.as_bytes());
    hex::encode(hasher.finalize())
}

/// Anonymous fingerprint derived from the caller's network identity, so
/// rate limits track per-caller even without a token.
pub fn anonymous_fingerprint(network_id: &str) -> String {
    fingerprint_hash(network_id)
}
