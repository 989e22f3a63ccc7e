use observatory_core::{ErrorKind, JobId, JobStatus};
use serde::{Deserialize, Serialize};

/// `options.priority` (spec §3). Restriction to `partner` tier (Open
/// Question 1, resolved in SPEC_FULL.md/DESIGN.md) is enforced by the
/// Lifecycle Controller before a job reaches the store, not here — the
/// store persists whatever priority it is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Recognized `options` fields (spec §3). Unknown keys are rejected at the
/// HTTP boundary before this struct is ever constructed.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalysisOptions {
    #[serde(default)]
    pub pattern_types: Vec<String>,
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatch {
    pub kind: String,
    pub span: String,
    pub confidence: f64,
    #[serde(default)]
    pub evidence: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sentiment {
    pub polarity: f64,
    pub intensity: f64,
}

/// Structured analysis result (spec §3). `coerced` is `true` when a
/// confidence or sentiment value outside its declared range was clamped
/// (spec §4.4 edge case).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub patterns: Vec<PatternMatch>,
    pub themes: Vec<String>,
    pub sentiment: Sentiment,
    pub processing_seconds: f64,
    pub model_identifier: String,
    #[serde(default)]
    pub coerced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
}

/// The central entity (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub owner_fingerprint: String,
    pub status: JobStatus,
    pub conversation_text: String,
    pub options: AnalysisOptions,
    pub result: Option<AnalysisResult>,
    pub error: Option<JobErrorDetail>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub expires_at: String,
    pub cancel_requested: bool,
}
