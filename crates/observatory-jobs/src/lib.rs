pub mod db;
pub mod error;
pub mod reaper;
pub mod store;
pub mod types;

pub use error::{JobStoreError, Result};
pub use reaper::Reaper;
pub use store::JobStore;
pub use types::{AnalysisOptions, AnalysisResult, Job, JobErrorDetail, PatternMatch, Priority, Sentiment};
