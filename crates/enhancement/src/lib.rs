//! Media enhancement filters
//!
//! Quality-improvement pipelines per media type:
//! - Image: unsharp-mask detail enhancement, median denoise, 1.5x upscale
//! - Audio: high/low-pass cleanup and peak normalization (WAV in-process, other containers via ffmpeg)
//! - Video: ffmpeg denoise, sharpen and temporal smoothing
//!
//! Every run writes into a fresh directory under the engine's output root and
//! returns an [`EnhancementReport`] carrying the encoded output.
//!
//! # Example
//! ```no_run
//! use media_insight_common::detect_media_type;
//! use media_insight_enhancement::{EnhancementEngine, FilterEnhancer};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = FilterEnhancer::new(std::env::temp_dir());
//! let descriptor = detect_media_type("photo.png", None);
//! let report = engine.enhance(Path::new("photo.png"), &descriptor)?;
//! println!("{} -> {}", report.summary, report.output_path.display());
//! # Ok(())
//! # }
//! ```

mod audio;
mod image_filters;
mod video;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use media_insight_common::{human_file_size, MediaDescriptor, MediaType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Enhancement errors
#[derive(Debug, Error)]
pub enum EnhancementError {
    #[error("Unable to decode {media_type} input: {reason}")]
    Undecodable {
        media_type: MediaType,
        reason: String,
    },

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(MediaType),

    #[error("ffmpeg execution failed: {0}")]
    Ffmpeg(String),

    #[error("Failed to encode output: {0}")]
    Encode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of one enhancement run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancementReport {
    /// Human-readable list of the filters applied
    pub summary: String,
    pub output_path: PathBuf,
    /// Base64 of the enhanced file
    #[serde(rename = "base64")]
    pub encoded_output: String,
    /// Formatted size of the enhanced file
    pub output_size: String,
    pub mime_type: String,
    pub file_name: String,
    /// Type-specific metrics (`resolution`, `fps`, `duration`, ...)
    #[serde(flatten)]
    pub metrics: BTreeMap<String, serde_json::Value>,
}

/// Media quality-improvement collaborator
pub trait EnhancementEngine: Send + Sync {
    /// Enhance the file at `input`; fails if it cannot be decoded as the declared type
    fn enhance(
        &self,
        input: &Path,
        descriptor: &MediaDescriptor,
    ) -> Result<EnhancementReport, EnhancementError>;
}

/// Filter-based engine writing results below `output_root`
#[derive(Debug, Clone)]
pub struct FilterEnhancer {
    output_root: PathBuf,
}

impl FilterEnhancer {
    #[must_use]
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    /// Create a unique directory for one run
    fn output_dir(&self) -> Result<PathBuf, EnhancementError> {
        let dir = self
            .output_root
            .join(format!("ai-enhance-{}", uuid::Uuid::new_v4().simple()));
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

impl EnhancementEngine for FilterEnhancer {
    fn enhance(
        &self,
        input: &Path,
        descriptor: &MediaDescriptor,
    ) -> Result<EnhancementReport, EnhancementError> {
        info!(
            "Enhancing {} as {}",
            input.display(),
            descriptor.media_type
        );

        match descriptor.media_type {
            MediaType::Image => image_filters::enhance_image(input, descriptor, &self.output_dir()?),
            MediaType::Audio => audio::enhance_audio(input, descriptor, &self.output_dir()?),
            MediaType::Video => video::enhance_video(input, &self.output_dir()?),
            MediaType::Unknown => Err(EnhancementError::UnsupportedMediaType(MediaType::Unknown)),
        }
    }
}

/// Read back the written output and assemble the report
fn build_report(
    output_path: PathBuf,
    steps: &[&str],
    mime_type: String,
    metrics: BTreeMap<String, serde_json::Value>,
) -> Result<EnhancementReport, EnhancementError> {
    let bytes = std::fs::read(&output_path)?;
    let file_name = output_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    info!(
        "Enhancement output {} ({})",
        output_path.display(),
        human_file_size(bytes.len() as u64)
    );

    Ok(EnhancementReport {
        summary: steps.join("; "),
        encoded_output: STANDARD.encode(&bytes),
        output_size: human_file_size(bytes.len() as u64),
        mime_type,
        file_name,
        output_path,
        metrics,
    })
}
