//! Inference backend integration
//!
//! The backend performs media understanding, moderation and subtitle
//! generation. Two implementations exist:
//! - [`DeepSeekClient`]: live chat-completions backend
//! - [`StandInBackend`]: deterministic placeholder output, no network
//!
//! [`select_backend`] picks one once at startup; callers only ever hold an
//! `Arc<dyn InferenceBackend>`.

mod config;
mod deepseek;
mod error;
mod stand_in;
mod types;

use async_trait::async_trait;
use media_insight_common::MediaDescriptor;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub use config::InferenceConfig;
pub use deepseek::DeepSeekClient;
pub use error::InferenceError;
pub use stand_in::{StandInBackend, PLACEHOLDER_SRT};
pub use types::{AnalysisReport, ModerationVerdict, RiskLevel, SubtitleBundle};

/// Which backend variant was selected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Live,
    StandIn,
}

/// Media understanding collaborator
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Variant of this backend
    fn kind(&self) -> BackendKind;

    /// Whether this is a live, configured backend
    fn is_configured(&self) -> bool {
        self.kind() == BackendKind::Live
    }

    /// Combined tags / scene / emotion / moderation analysis in one call
    async fn analyze_media(
        &self,
        media: &Path,
        descriptor: &MediaDescriptor,
        tasks: &[String],
        languages: &[String],
    ) -> Result<AnalysisReport, InferenceError>;

    /// Dedicated moderation call
    async fn moderate_media(
        &self,
        media: &Path,
        descriptor: &MediaDescriptor,
    ) -> Result<ModerationVerdict, InferenceError>;

    /// Multi-language SRT subtitles for the whole file
    async fn generate_subtitles(
        &self,
        media: &Path,
        descriptor: &MediaDescriptor,
        languages: &[String],
    ) -> Result<SubtitleBundle, InferenceError>;
}

/// Choose the live client when an API key is configured, otherwise the stand-in
pub fn select_backend(config: &InferenceConfig) -> Result<Arc<dyn InferenceBackend>, InferenceError> {
    if config.is_configured() {
        info!("Using DeepSeek backend at {} (model={})", config.api_base, config.model);
        Ok(Arc::new(DeepSeekClient::new(config)?))
    } else {
        info!("DEEPSEEK_API_KEY not set, using deterministic stand-in backend");
        Ok(Arc::new(StandInBackend::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_stand_in_without_key() {
        let backend = select_backend(&InferenceConfig::default()).unwrap();
        assert_eq!(backend.kind(), BackendKind::StandIn);
        assert!(!backend.is_configured());
    }

    #[test]
    fn test_select_live_with_key() {
        let config = InferenceConfig {
            api_key: Some("sk-test".to_string()),
            ..InferenceConfig::default()
        };
        let backend = select_backend(&config).unwrap();
        assert_eq!(backend.kind(), BackendKind::Live);
        assert!(backend.is_configured());
    }
}
