//! Analyzer Dispatcher. A bounded worker pool drains `DispatchQueue`,
//! claims each job, invokes the backend with retry, and records the
//! outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};

use observatory_core::{ErrorKind, JobId};
use observatory_jobs::{JobErrorDetail, JobStore, Priority};
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::backend::{AnalysisBackend, BackendOptions, BackendRequest};
use crate::callback;
use crate::error::DispatchError;
use crate::parse::parse_backend_text;
use crate::prompt::PromptTemplate;
use crate::queue::DispatchQueue;
use crate::retry::Backoff;

/// Resolves the per-tier HMAC secret used to sign callback notifications.
/// Implemented by the gateway, which knows how to map an owner
/// fingerprint back to a tier via the Credential Resolver.
pub trait CallbackSecretProvider: Send + Sync {
    fn secret_for(&self, owner_fingerprint: &str) -> String;
}

pub struct NullCallbackSecrets;

impl CallbackSecretProvider for NullCallbackSecrets {
    fn secret_for(&self, _owner_fingerprint: &str) -> String {
        String::new()
    }
}

pub struct DispatcherConfig {
    pub backend_timeout: Duration,
    pub max_retries: u32,
    pub worker_count: usize,
    pub queue_depth: usize,
}

pub struct Dispatcher {
    queue: Arc<DispatchQueue>,
    store: Arc<JobStore>,
    backend: Arc<dyn AnalysisBackend>,
    http: reqwest::Client,
    config: Arc<DispatcherConfig>,
    callback_secrets: Arc<dyn CallbackSecretProvider>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<JobStore>,
        backend: Arc<dyn AnalysisBackend>,
        config: DispatcherConfig,
        callback_secrets: Arc<dyn CallbackSecretProvider>,
    ) -> Self {
        Self {
            queue: Arc::new(DispatchQueue::new(config.queue_depth)),
            store,
            backend,
            http: reqwest::Client::new(),
            config: Arc::new(config),
            callback_secrets,
        }
    }

    pub fn queue(&self) -> Arc<DispatchQueue> {
        self.queue.clone()
    }

    /// Enqueues a freshly created, still-`pending` job for dispatch.
    /// Returns `false` (the HTTP layer maps this to `busy`/503) when the
    /// queue is saturated.
    pub fn enqueue(&self, id: JobId, priority: Priority) -> bool {
        self.queue.push(id, priority)
    }

    /// Spawns `worker_count` worker tasks, each looping until `shutdown`
    /// fires. Returns their join handles so the caller can await a clean
    /// shutdown.
    pub fn spawn_workers(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<tokio::task::JoinHandle<()>> {
        (0..self.config.worker_count)
            .map(|worker_id| {
                let dispatcher = self.clone();
                let mut shutdown = shutdown.clone();
                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            id = dispatcher.queue.pop() => {
                                dispatcher.process(worker_id, id).await;
                            }
                            _ = shutdown.changed() => {
                                if *shutdown.borrow() {
                                    info!(worker_id, "dispatcher worker shutting down");
                                    break;
                                }
                            }
                        }
                    }
                })
            })
            .collect()
    }

    #[instrument(skip(self), fields(worker_id))]
    async fn process(&self, worker_id: usize, id: JobId) {
        // Checkpoint 1: claim is the arbiter between racing workers.
        match self.store.claim(&id) {
            Ok(true) => {}
            Ok(false) => return, // another worker won, or job was cancelled/reaped first
            Err(err) => {
                warn!(worker_id, job_id = %id, error = %err, "claim failed");
                return;
            }
        }

        let job = match self.store.get(&id, None) {
            Ok(job) => job,
            Err(err) => {
                warn!(worker_id, job_id = %id, error = %err, "post-claim fetch failed");
                return;
            }
        };

        // Checkpoint 2: post-claim, pre-dispatch.
        if job.cancel_requested {
            let _ = self.store.mark_cancelled(&id);
            return;
        }

        let prompt = PromptTemplate::render(&job.options, &job.conversation_text);
        let request = BackendRequest {
            prompt,
            options: BackendOptions { pattern_types: job.options.pattern_types.clone() },
        };

        let backoff = Backoff::new(Duration::from_secs(1), 2.0, self.config.max_retries);
        let start = Instant::now();
        let mut last_err: Option<DispatchError> = None;

        'attempts: for attempt in 0..=backoff.max_retries() {
            // Checkpoint 3: between each network attempt.
            if let Ok(refreshed) = self.store.get(&id, None) {
                if refreshed.cancel_requested {
                    let _ = self.store.mark_cancelled(&id);
                    return;
                }
            }

            match self.backend.generate(&request, self.config.backend_timeout).await {
                Ok(resp) => {
                    let processing_seconds = start.elapsed().as_secs_f64();
                    match parse_backend_text(&resp.text, &resp.model, processing_seconds) {
                        Ok(result) => {
                            if self.store.complete(&id, &result).is_ok() {
                                info!(worker_id, job_id = %id, "job completed");
                                self.send_callback(&id).await;
                            }
                            return;
                        }
                        Err(err) => {
                            last_err = Some(err);
                            break 'attempts;
                        }
                    }
                }
                Err(err) => {
                    let retriable = err.retriable();
                    last_err = Some(err);
                    if !retriable || attempt == backoff.max_retries() {
                        break 'attempts;
                    }
                    tokio::time::sleep(backoff.delay_for(attempt + 1)).await;
                }
            }
        }

        let err = last_err.unwrap_or(DispatchError::BackendUnavailable("exhausted retries".to_string()));
        let kind = match err {
            DispatchError::Timeout => ErrorKind::Timeout,
            DispatchError::ParseError(_) => ErrorKind::ParseError,
            DispatchError::BackendUnavailable(_) | DispatchError::BackendRejected(_) => {
                ErrorKind::BackendUnavailable
            }
            DispatchError::Cancelled => ErrorKind::Internal,
        };
        let detail = JobErrorDetail { kind, message: err.to_string() };
        if self.store.fail(&id, &detail).is_ok() {
            warn!(worker_id, job_id = %id, kind = kind.as_str(), "job failed");
            self.send_callback(&id).await;
        }
    }

    async fn send_callback(&self, id: &JobId) {
        let Ok(job) = self.store.get(id, None) else { return };
        if job.options.callback_url.is_none() {
            return;
        }
        let secret = self.callback_secrets.secret_for(&job.owner_fingerprint);
        callback::notify(&self.http, &job, &secret).await;
    }
}

/// Independent shutdown signal for the worker pool, separate from the
/// reaper's own `watch` channel so each subsystem can be stopped on its
/// own schedule.
pub fn shutdown_pair() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendResponse;
    use async_trait::async_trait;
    use observatory_jobs::{db, AnalysisOptions};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    struct ScriptedBackend {
        responses: StdMutex<Vec<crate::error::Result<BackendResponse>>>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl AnalysisBackend for ScriptedBackend {
        async fn generate(&self, _req: &BackendRequest, _deadline: Duration) -> crate::error::Result<BackendResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses.lock().unwrap().remove(0)
        }
    }

    fn test_store() -> Arc<JobStore> {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        db::init_db(&conn).unwrap();
        Arc::new(JobStore::new(Arc::new(std::sync::Mutex::new(conn)), 300, 2_592_000, 86_400))
    }

    fn test_dispatcher(backend: ScriptedBackend) -> (Arc<Dispatcher>, Arc<JobStore>) {
        let store = test_store();
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            Arc::new(backend),
            DispatcherConfig {
                backend_timeout: Duration::from_secs(5),
                max_retries: 2,
                worker_count: 1,
                queue_depth: 16,
            },
            Arc::new(NullCallbackSecrets),
        ));
        (dispatcher, store)
    }

    #[tokio::test]
    async fn successful_generate_completes_job() {
        let backend = ScriptedBackend {
            responses: StdMutex::new(vec![Ok(BackendResponse {
                text: r#"{"patterns":[],"themes":["greeting"],"sentiment":{"polarity":0.5,"intensity":0.2}}"#
                    .to_string(),
                model: "llama3".to_string(),
                finish_reason: Some("stop".to_string()),
            })]),
            calls: AtomicU32::new(0),
        };
        let (dispatcher, store) = test_dispatcher(backend);
        let job = store.create("fp1", "Human: hi\nAI: hello", &AnalysisOptions::default()).unwrap();

        dispatcher.process(0, job.id.clone()).await;

        let fetched = store.get(&job.id, None).unwrap();
        assert_eq!(fetched.status, observatory_core::JobStatus::Completed);
        assert_eq!(fetched.result.unwrap().themes, vec!["greeting".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn retriable_failure_retries_then_succeeds() {
        let backend = ScriptedBackend {
            responses: StdMutex::new(vec![
                Err(DispatchError::BackendUnavailable("connection reset".to_string())),
                Ok(BackendResponse {
                    text: r#"{"patterns":[],"themes":[],"sentiment":{"polarity":0.0,"intensity":0.0}}"#.to_string(),
                    model: "llama3".to_string(),
                    finish_reason: None,
                }),
            ]),
            calls: AtomicU32::new(0),
        };
        let (dispatcher, store) = test_dispatcher(backend);
        let job = store.create("fp1", "hi", &AnalysisOptions::default()).unwrap();

        dispatcher.process(0, job.id.clone()).await;

        let fetched = store.get(&job.id, None).unwrap();
        assert_eq!(fetched.status, observatory_core::JobStatus::Completed);
    }

    #[tokio::test]
    async fn fatal_4xx_is_not_retried() {
        let backend = ScriptedBackend {
            responses: StdMutex::new(vec![Err(DispatchError::BackendRejected("bad request".to_string()))]),
            calls: AtomicU32::new(0),
        };
        let (dispatcher, store) = test_dispatcher(backend);
        let job = store.create("fp1", "hi", &AnalysisOptions::default()).unwrap();

        dispatcher.process(0, job.id.clone()).await;

        let fetched = store.get(&job.id, None).unwrap();
        assert_eq!(fetched.status, observatory_core::JobStatus::Failed);
        assert_eq!(fetched.error.unwrap().kind, ErrorKind::BackendUnavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_fail_as_backend_unavailable() {
        let backend = ScriptedBackend {
            responses: StdMutex::new(vec![
                Err(DispatchError::Timeout),
                Err(DispatchError::Timeout),
                Err(DispatchError::Timeout),
            ]),
            calls: AtomicU32::new(0),
        };
        let (dispatcher, store) = test_dispatcher(backend);
        let job = store.create("fp1", "hi", &AnalysisOptions::default()).unwrap();

        dispatcher.process(0, job.id.clone()).await;

        let fetched = store.get(&job.id, None).unwrap();
        assert_eq!(fetched.status, observatory_core::JobStatus::Failed);
        assert_eq!(fetched.error.unwrap().kind, ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn cancel_requested_before_dispatch_marks_cancelled() {
        let backend = ScriptedBackend { responses: StdMutex::new(vec![]), calls: AtomicU32::new(0) };
        let (dispatcher, store) = test_dispatcher(backend);
        let job = store.create("fp1", "hi", &AnalysisOptions::default()).unwrap();
        store.request_cancel(&job.id, "fp1").unwrap();

        dispatcher.process(0, job.id.clone()).await;

        let fetched = store.get(&job.id, Some("fp1")).unwrap();
        assert_eq!(fetched.status, observatory_core::JobStatus::Cancelled);
    }
}
