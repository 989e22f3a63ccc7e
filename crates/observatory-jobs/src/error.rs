use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("job not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid job state for this operation")]
    InvalidState,
}

impl JobStoreError {
    pub fn code(&self) -> &'static str {
        match self {
            JobStoreError::NotFound => "not_found",
            JobStoreError::Database(_) => "internal",
            JobStoreError::InvalidState => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, JobStoreError>;
