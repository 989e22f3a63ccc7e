//! Service configuration, loaded from an optional TOML file and overlaid
//! with `OBSERVATORY_`-prefixed environment variables.
//!
//! Every field carries a default so an empty or partial config file is
//! valid, and unknown top-level keys in the file are ignored rather than
//! rejected: the *wire* schema (request bodies) is closed, but the
//! *config-file* schema stays forgiving.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

fn default_max_input_chars() -> usize {
    100_000
}
fn default_pending_ttl_secs() -> i64 {
    300
}
fn default_result_ttl_secs() -> i64 {
    30 * 24 * 3600
}
fn default_cancelled_ttl_secs() -> i64 {
    24 * 3600
}
fn default_backend_url() -> String {
    "http://127.0.0.1:11434".to_string()
}
fn default_backend_timeout_secs() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    2
}
fn default_worker_count() -> usize {
    4
}
fn default_queue_depth() -> usize {
    256
}
fn default_reaper_tick_secs() -> u64 {
    60
}
fn default_credential_cache_ttl_secs() -> u64 {
    60
}
fn default_credential_cache_capacity() -> usize {
    10_000
}
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_db_path() -> String {
    "observatory.sqlite3".to_string()
}
fn default_request_timeout_secs() -> u64 {
    30
}

/// Per-window request limits for one tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WindowLimits {
    pub per_minute: u64,
    pub per_hour: u64,
    pub per_day: u64,
}

/// Tier table: per-minute/hour/day request limits for each credential tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TiersConfig {
    pub public: WindowLimits,
    pub api_key: WindowLimits,
    pub partner: WindowLimits,
    /// Host/scheme patterns each tier may use in `callback_url`; partner
    /// is allowed a wider scheme/host set than public or api_key.
    pub callback_url_allowlist_public: Vec<String>,
    pub callback_url_allowlist_api_key: Vec<String>,
    pub callback_url_allowlist_partner: Vec<String>,
}

impl Default for TiersConfig {
    fn default() -> Self {
        Self {
            public: WindowLimits { per_minute: 10, per_hour: 100, per_day: 1_000 },
            api_key: WindowLimits { per_minute: 60, per_hour: 1_000, per_day: 10_000 },
            partner: WindowLimits { per_minute: 600, per_hour: 10_000, per_day: 100_000 },
            callback_url_allowlist_public: vec!["https://*".to_string()],
            callback_url_allowlist_api_key: vec!["https://*".to_string()],
            callback_url_allowlist_partner: vec!["https://*".to_string(), "http://*".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlConfig {
    #[serde(default = "default_pending_ttl_secs")]
    pub pending_ttl_secs: i64,
    #[serde(default = "default_result_ttl_secs")]
    pub result_ttl_secs: i64,
    #[serde(default = "default_cancelled_ttl_secs")]
    pub cancelled_ttl_secs: i64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            pending_ttl_secs: default_pending_ttl_secs(),
            result_ttl_secs: default_result_ttl_secs(),
            cancelled_ttl_secs: default_cancelled_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    #[serde(default = "default_backend_timeout_secs")]
    pub backend_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            backend_timeout_secs: default_backend_timeout_secs(),
            max_retries: default_max_retries(),
            worker_count: default_worker_count(),
            queue_depth: default_queue_depth(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_reaper_tick_secs")]
    pub reaper_tick_secs: u64,
    #[serde(default = "default_credential_cache_ttl_secs")]
    pub credential_cache_ttl_secs: u64,
    #[serde(default = "default_credential_cache_capacity")]
    pub credential_cache_capacity: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            db_path: default_db_path(),
            reaper_tick_secs: default_reaper_tick_secs(),
            credential_cache_ttl_secs: default_credential_cache_ttl_secs(),
            credential_cache_capacity: default_credential_cache_capacity(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ObservatoryConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tiers: TiersConfig,
    #[serde(default)]
    pub ttl: TtlConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
}

impl ObservatoryConfig {
    /// Load from an optional TOML file overlaid with environment
    /// variables prefixed `OBSERVATORY_`, split on `_` into nested keys
    /// (e.g. `OBSERVATORY_DISPATCHER_MAX_RETRIES`). Falls back to defaults
    /// entirely when no file is present at `path`.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(ObservatoryConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("OBSERVATORY_").split("_"));

        figment
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))
    }
}
