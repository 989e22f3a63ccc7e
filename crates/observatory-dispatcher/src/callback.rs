//! Terminal-status callback notification. Best-effort: delivery failures
//! never re-open the job. Signs the outbound body with an HMAC so the
//! receiver can verify it came from this service.

use hmac::{Hmac, Mac};
use observatory_jobs::Job;
use serde_json::json;
use sha2::Sha256;
use std::time::Duration;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

const NOTIFY_RETRIES: u32 = 2;
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

fn sign(body: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// POSTs a terminal-status notification to `job.options.callback_url`, if
/// present. Best-effort with a short retry schedule of its own; any
/// outcome (success or exhausted retries) is logged and never propagated
/// to the job's own status.
pub async fn notify(client: &reqwest::Client, job: &Job, per_tier_secret: &str) {
    let Some(url) = job.options.callback_url.clone() else {
        return;
    };

    let body = json!({
        "id": job.id.as_str(),
        "status": job.status.as_db_str(),
        "finished_at": job.finished_at,
    });
    let body_bytes = serde_json::to_vec(&body).expect("notification body always serializes");
    let signature = sign(&body_bytes, per_tier_secret);

    for attempt in 0..=NOTIFY_RETRIES {
        let result = client
            .post(&url)
            .header("content-type", "application/json")
            .header("x-observatory-signature", format!("sha256={signature}"))
            .timeout(NOTIFY_TIMEOUT)
            .body(body_bytes.clone())
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => return,
            Ok(resp) => {
                warn!(job_id = %job.id, status = %resp.status(), attempt, "callback notification rejected");
            }
            Err(err) => {
                warn!(job_id = %job.id, error = %err, attempt, "callback notification failed");
            }
        }

        if attempt < NOTIFY_RETRIES {
            tokio::time::sleep(Duration::from_millis(200 * (attempt as u64 + 1))).await;
        }
    }

    warn!(job_id = %job.id, "callback notification exhausted retries, giving up");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_for_same_body_and_secret() {
        let a = sign(b"hello", "secret");
        let b = sign(b"hello", "secret");
        assert_eq!(a, b);
    }

    #[test]
    fn signature_differs_across_secrets() {
        let a = sign(b"hello", "secret-a");
        let b = sign(b"hello", "secret-b");
        assert_ne!(a, b);
    }
}
