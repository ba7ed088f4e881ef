use media_insight_inference::InferenceError;
use thiserror::Error;

/// Failures of the synchronous request path
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Inference backend failed; callers may retry later
    #[error("Inference backend error: {0}")]
    Backend(#[from] InferenceError),

    /// Request cannot be served as given
    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
