pub mod backend;
pub mod callback;
pub mod dispatcher;
pub mod error;
pub mod parse;
pub mod prompt;
pub mod queue;
pub mod retry;

pub use backend::{AnalysisBackend, BackendOptions, BackendRequest, BackendResponse, HttpBackend};
pub use dispatcher::{shutdown_pair, CallbackSecretProvider, Dispatcher, DispatcherConfig, NullCallbackSecrets};
pub use error::{DispatchError, Result};
pub use queue::DispatchQueue;
