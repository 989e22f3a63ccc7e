use thiserror::Error;

/// Errors the Credential Resolver can raise. Kept separate from
/// `observatory_core::CoreError` so the gateway can map them to the
/// right HTTP status without coupling layers.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credential not found")]
    NotFound,

    #[error("credential is inactive")]
    Inactive,

    #[error("credential has expired")]
    Expired,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::NotFound | AuthError::Inactive | AuthError::Expired => "invalid_credential",
            AuthError::Database(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
