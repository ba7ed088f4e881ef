use std::time::Duration;
use tracing::warn;

const DEFAULT_API_BASE: &str = "https://api.deepseek.com/v1";
const DEFAULT_MODEL: &str = "deepseek-chat";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Connection settings for the chat completions backend
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// API key; `None` selects the deterministic stand-in backend
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl InferenceConfig {
    /// Read `DEEPSEEK_API_KEY`, `DEEPSEEK_API_BASE`, `DEEPSEEK_MODEL` and `DEEPSEEK_TIMEOUT`
    #[must_use]
    pub fn from_env() -> Self {
        let timeout_secs = match std::env::var("DEEPSEEK_TIMEOUT") {
            Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!("Ignoring invalid DEEPSEEK_TIMEOUT={raw:?}, using {DEFAULT_TIMEOUT_SECS}s");
                DEFAULT_TIMEOUT_SECS
            }),
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };

        Self {
            api_key: std::env::var("DEEPSEEK_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            api_base: std::env::var("DEEPSEEK_API_BASE")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            model: std::env::var("DEEPSEEK_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Whether a live backend can be built from this configuration
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}
