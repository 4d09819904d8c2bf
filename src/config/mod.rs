use serde::Deserialize;
use std::time::Duration;

use crate::registry::breaker::BreakerConfig;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Redis connection string for the job store
    pub redis_url: String,

    /// Directory where async uploads are spooled until a worker picks them up
    #[serde(default = "default_spool_dir")]
    pub spool_dir: String,

    /// Directory where completed job results are persisted
    #[serde(default = "default_results_dir")]
    pub results_dir: String,

    /// Maximum document size for the synchronous path
    #[serde(default = "default_sync_limit_bytes")]
    pub sync_limit_bytes: u64,

    /// Maximum document size for the asynchronous path
    #[serde(default = "default_async_limit_bytes")]
    pub async_limit_bytes: u64,

    /// Hard wall-clock deadline for synchronous recognition
    #[serde(default = "default_sync_timeout_secs")]
    pub sync_timeout_secs: u64,

    /// Wall-clock deadline applied by the worker to asynchronous jobs
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// Retention window applied to completed and failed jobs
    #[serde(default = "default_job_retention_hours")]
    pub job_retention_hours: i64,

    /// Disable to bypass the per-engine circuit breaker entirely
    #[serde(default = "default_breaker_enabled")]
    pub breaker_enabled: bool,

    /// Consecutive failures before an engine's circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Consecutive successes that clear the failure count
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// Seconds an open circuit waits before the next availability check
    /// probes it closed
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Fail startup on a broken engine registration instead of skipping it
    #[serde(default)]
    pub strict_discovery: bool,

    /// Default language passed to the tesseract engine
    #[serde(default = "default_tesseract_language")]
    pub tesseract_language: String,

    /// HTTP endpoint of the neural recognizer; engine reports unavailable
    /// when unset
    #[serde(default)]
    pub neural_endpoint: Option<String>,

    /// Bearer token for the neural recognizer
    #[serde(default)]
    pub neural_api_token: Option<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_spool_dir() -> String {
    "./spool".to_string()
}

fn default_results_dir() -> String {
    "./results".to_string()
}

fn default_sync_limit_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_async_limit_bytes() -> u64 {
    25 * 1024 * 1024
}

fn default_sync_timeout_secs() -> u64 {
    30
}

fn default_job_timeout_secs() -> u64 {
    300
}

fn default_job_retention_hours() -> i64 {
    48
}

fn default_breaker_enabled() -> bool {
    true
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_success_threshold() -> u32 {
    3
}

fn default_cooldown_secs() -> u64 {
    300
}

fn default_tesseract_language() -> String {
    "eng".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn breaker(&self) -> BreakerConfig {
        BreakerConfig {
            enabled: self.breaker_enabled,
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            cooldown: Duration::from_secs(self.cooldown_secs),
        }
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.job_retention_hours)
    }
}
