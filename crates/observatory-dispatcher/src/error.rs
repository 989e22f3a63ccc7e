use thiserror::Error;

/// Errors the Analyzer Dispatcher can raise while driving a single job to
/// a terminal state (spec §4.4, §7).
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// 4xx from the backend — fatal, not retried (spec §4.4 step 6), but
    /// still a backend-side problem rather than a parsing one.
    #[error("backend rejected request: {0}")]
    BackendRejected(String),

    #[error("backend response could not be parsed: {0}")]
    ParseError(String),

    #[error("backend call timed out")]
    Timeout,

    #[error("cancelled")]
    Cancelled,
}

impl DispatchError {
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::BackendUnavailable(_) => "backend_unavailable",
            DispatchError::BackendRejected(_) => "backend_unavailable",
            DispatchError::ParseError(_) => "parse_error",
            DispatchError::Timeout => "timeout",
            DispatchError::Cancelled => "internal",
        }
    }

    /// Whether the dispatcher should retry after this error (spec §4.4
    /// step 6: "retry only on transport/5xx/timeout; 4xx is fatal").
    pub fn retriable(&self) -> bool {
        matches!(self, DispatchError::BackendUnavailable(_) | DispatchError::Timeout)
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
