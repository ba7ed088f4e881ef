use media_insight_common::ProcessingError;
use thiserror::Error;

/// Failures talking to the inference backend
///
/// Timeouts surface as [`InferenceError::Transport`] like any other
/// connection failure.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("DeepSeek API key not configured")]
    NotConfigured,

    #[error("DeepSeek request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("DeepSeek API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unable to parse DeepSeek response: {0}")]
    Malformed(String),

    #[error("Failed to prepare media sample: {0}")]
    Media(#[from] ProcessingError),
}
