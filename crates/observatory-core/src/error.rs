use thiserror::Error;

/// Crate-wide errors for configuration and shared plumbing.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),
}

impl CoreError {
    /// Stable machine-readable classifier, mirrored by every crate-local
    /// error type so the gateway can map errors uniformly.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Config(_) => "internal",
            CoreError::InvalidValue(_) => "invalid_input",
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
