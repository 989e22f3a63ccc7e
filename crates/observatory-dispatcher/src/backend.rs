//! The LLM backend is an external service, consumed through a single
//! narrow trait so the HTTP implementation can be swapped for a test
//! double without touching dispatch logic.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct BackendRequest {
    pub prompt: String,
    pub options: BackendOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendOptions {
    pub pattern_types: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendResponse {
    pub text: String,
    pub model: String,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Narrow interface to the LLM backend: `POST <backend>/generate` with
/// `{prompt, options}`, returning `{text, model, finish_reason}`.
/// Transport/5xx/timeout failures are reported as `BackendUnavailable`;
/// the dispatcher is responsible for retrying, this trait just reports.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn generate(&self, req: &BackendRequest, deadline: Duration) -> Result<BackendResponse>;
}

/// reqwest-backed implementation with connect/timeout/status classification.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl AnalysisBackend for HttpBackend {
    async fn generate(&self, req: &BackendRequest, deadline: Duration) -> Result<BackendResponse> {
        let url = format!("{}/generate", self.base_url);

        let resp = self
            .client
            .post(&url)
            .json(req)
            .timeout(deadline)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DispatchError::Timeout
                } else {
                    DispatchError::BackendUnavailable(e.to_string())
                }
            })?;

        let status = resp.status();
        if status.is_server_error() || status.as_u16() == 408 {
            let text = resp.text().await.unwrap_or_default();
            return Err(DispatchError::BackendUnavailable(format!(
                "backend returned {status}: {text}"
            )));
        }
        if status.is_client_error() {
            let text = resp.text().await.unwrap_or_default();
            return Err(DispatchError::BackendRejected(format!(
                "backend rejected request ({status}): {text}"
            )));
        }

        resp.json::<BackendResponse>()
            .await
            .map_err(|e| DispatchError::ParseError(e.to_string()))
    }
}
