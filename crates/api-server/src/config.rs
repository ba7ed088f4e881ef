use media_insight_inference::InferenceConfig;
use media_insight_orchestrator::DEFAULT_CONCURRENCY;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

const DEFAULT_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_UPLOAD_DIR: &str = "./ai_uploads";
const DEFAULT_JOB_RETENTION_SECS: u64 = 3600;
const DEFAULT_SESSION_IDLE_SECS: u64 = 600;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Server settings read from the environment
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address
    pub addr: String,
    /// Stored uploads and live session buffers
    pub upload_dir: PathBuf,
    /// Jobs executing at once
    pub job_concurrency: usize,
    /// How long finished jobs stay queryable
    pub job_retention: Duration,
    /// Sessions without chunks for this long are discarded
    pub session_idle: Duration,
    pub sweep_interval: Duration,
    pub max_upload_bytes: usize,
    pub inference: InferenceConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            job_concurrency: DEFAULT_CONCURRENCY,
            job_retention: Duration::from_secs(DEFAULT_JOB_RETENTION_SECS),
            session_idle: Duration::from_secs(DEFAULT_SESSION_IDLE_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            inference: InferenceConfig::default(),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            addr: std::env::var("API_SERVER_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string()),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            job_concurrency: env_or("JOB_CONCURRENCY", DEFAULT_CONCURRENCY),
            job_retention: Duration::from_secs(env_or(
                "JOB_RETENTION_SECS",
                DEFAULT_JOB_RETENTION_SECS,
            )),
            session_idle: Duration::from_secs(env_or(
                "SESSION_IDLE_SECS",
                DEFAULT_SESSION_IDLE_SECS,
            )),
            sweep_interval: Duration::from_secs(
                env_or("SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS).max(1),
            ),
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            inference: InferenceConfig::from_env(),
        }
    }
}

/// Parse `key`, falling back to `default` when unset or malformed
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_or(key, &raw, default),
        Err(_) => default,
    }
}

fn parse_or<T>(key: &str, raw: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    raw.trim().parse().unwrap_or_else(|_| {
        warn!("Ignoring invalid {}={:?}, using {}", key, raw, default);
        default
    })
}
