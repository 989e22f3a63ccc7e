use thiserror::Error;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("rate limit store error: {0}")]
    Store(String),
}

impl RateLimitError {
    pub fn code(&self) -> &'static str {
        "internal"
    }
}

pub type Result<T> = std::result::Result<T, RateLimitError>;
