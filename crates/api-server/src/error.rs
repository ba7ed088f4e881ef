use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use media_insight_inference::InferenceError;
use media_insight_orchestrator::OrchestratorError;
use thiserror::Error;
use tracing::error;

use crate::types::ErrorResponse;

/// Request-level failures, rendered as `{"error": message}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Orchestrator(OrchestratorError::Backend(_)) => StatusCode::BAD_GATEWAY,
            Self::Orchestrator(OrchestratorError::Input(_)) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Orchestrator(OrchestratorError::Internal(_)) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::JobNotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed ({}): {}", status, self);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Failures building or running the server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to initialise inference backend: {0}")]
    Inference(#[from] InferenceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let backend = ApiError::from(OrchestratorError::Backend(InferenceError::Malformed(
            "bad json".to_string(),
        )));
        assert_eq!(backend.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ApiError::from(OrchestratorError::Input("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(OrchestratorError::Internal("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::JobNotFound("abc".into()).status(),
            StatusCode::NOT_FOUND
        );
    }
}
