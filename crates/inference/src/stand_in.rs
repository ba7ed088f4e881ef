//! Deterministic stand-in used when no API key is configured
//!
//! Produces structurally valid payloads without any network access so the
//! layers above never need an "unconfigured" branch. Output depends only on
//! the media type, the file size and the requested languages.

use async_trait::async_trait;
use media_insight_common::{MediaDescriptor, MediaType};
use std::collections::BTreeMap;
use std::path::Path;

use crate::{
    AnalysisReport, BackendKind, InferenceBackend, InferenceError, ModerationVerdict, RiskLevel,
    SubtitleBundle,
};

/// Placeholder SRT returned for every requested language
pub const PLACEHOLDER_SRT: &str =
    "1\n00:00:00,000 --> 00:00:02,000\n[Sample subtitle] This is a placeholder subtitle.";

fn tag_pool(media_type: MediaType) -> &'static [&'static [&'static str]] {
    match media_type {
        MediaType::Image => &[
            &["landscape", "nature"],
            &["people", "selfie"],
            &["food", "dessert"],
            &["city", "night"],
        ],
        MediaType::Video => &[
            &["drama", "short film"],
            &["travel", "vlog"],
            &["party", "music"],
            &["pets", "daily life"],
        ],
        MediaType::Audio => &[
            &["music", "upbeat"],
            &["speech", "motivational"],
            &["podcast", "interview"],
            &["nature", "white noise"],
        ],
        MediaType::Unknown => &[&["file", "unrecognized"]],
    }
}

fn scene_for(media_type: MediaType) -> &'static str {
    match media_type {
        MediaType::Image => "outdoor",
        MediaType::Video => "indoor",
        MediaType::Audio => "studio",
        MediaType::Unknown => "unknown",
    }
}

/// Backend that answers every call with canned, deterministic data
#[derive(Debug, Clone, Default)]
pub struct StandInBackend;

impl StandInBackend {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn file_size(media: &Path, descriptor: &MediaDescriptor) -> u64 {
        tokio::fs::metadata(media)
            .await
            .map(|m| m.len())
            .unwrap_or(descriptor.size_bytes)
    }
}

#[async_trait]
impl InferenceBackend for StandInBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::StandIn
    }

    async fn analyze_media(
        &self,
        media: &Path,
        descriptor: &MediaDescriptor,
        _tasks: &[String],
        languages: &[String],
    ) -> Result<AnalysisReport, InferenceError> {
        let media_type = descriptor.media_type;
        let file_size = Self::file_size(media, descriptor).await;
        let pool = tag_pool(media_type);
        let tags = pool[(file_size % pool.len() as u64) as usize]
            .iter()
            .map(|t| (*t).to_string())
            .collect();
        let emotions = if media_type == MediaType::Unknown {
            vec!["unknown".to_string()]
        } else {
            vec!["cheerful".to_string(), "calm".to_string()]
        };

        Ok(AnalysisReport {
            tags,
            scene: Some(scene_for(media_type).to_string()),
            emotions,
            moderation: Some(ModerationVerdict {
                risk_level: RiskLevel::Safe,
                reasons: Vec::new(),
                guidance: "Content looks normal and is safe to use".to_string(),
            }),
            recommendations: vec!["Sample smart recommendation".to_string()],
            languages: languages
                .iter()
                .map(|lang| (lang.clone(), format!("Sample description ({lang})")))
                .collect(),
            subtitles: None,
            media_type,
            file_size,
            extra: serde_json::Map::new(),
        })
    }

    async fn moderate_media(
        &self,
        _media: &Path,
        _descriptor: &MediaDescriptor,
    ) -> Result<ModerationVerdict, InferenceError> {
        Ok(ModerationVerdict {
            risk_level: RiskLevel::Safe,
            reasons: Vec::new(),
            guidance: "No policy violations detected in the sample environment".to_string(),
        })
    }

    async fn generate_subtitles(
        &self,
        media: &Path,
        descriptor: &MediaDescriptor,
        languages: &[String],
    ) -> Result<SubtitleBundle, InferenceError> {
        let subtitles: BTreeMap<String, String> = languages
            .iter()
            .map(|lang| (lang.clone(), PLACEHOLDER_SRT.to_string()))
            .collect();

        Ok(SubtitleBundle {
            media_type: descriptor.media_type,
            file_size: Self::file_size(media, descriptor).await,
            subtitles,
        })
    }
}
