use media_insight_common::MediaDescriptor;
use media_insight_inference::{InferenceBackend, InferenceError};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::srt::latest_line;

/// Line emitted per language while no live backend is configured
pub const UNCONFIGURED_TRANSCRIPT: &str = "Configure DEEPSEEK_API_KEY to enable realtime subtitles";

/// Reduces backend subtitle output to incremental transcript lines
#[derive(Clone)]
pub struct StreamingTranscriber {
    backend: Arc<dyn InferenceBackend>,
}

impl StreamingTranscriber {
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self { backend }
    }

    /// Latest line per language for the whole buffer so far
    ///
    /// Never fails: backend errors become a failure line per language.
    pub async fn incremental(
        &self,
        buffer: &Path,
        descriptor: &MediaDescriptor,
        languages: &[String],
    ) -> BTreeMap<String, String> {
        if !self.backend.is_configured() {
            return per_language(languages, UNCONFIGURED_TRANSCRIPT);
        }

        match self
            .backend
            .generate_subtitles(buffer, descriptor, languages)
            .await
        {
            Ok(bundle) => {
                debug!(
                    "Transcribed {} ({} bytes)",
                    buffer.display(),
                    descriptor.size_bytes
                );
                bundle
                    .subtitles
                    .iter()
                    .map(|(lang, text)| (lang.clone(), latest_line(text)))
                    .collect()
            }
            Err(e) => {
                warn!("Realtime subtitles failed for {}: {}", buffer.display(), e);
                per_language(languages, &format!("Realtime subtitles failed: {e}"))
            }
        }
    }

    /// Full subtitles per language over the complete buffer
    pub async fn finalize(
        &self,
        buffer: &Path,
        descriptor: &MediaDescriptor,
        languages: &[String],
    ) -> Result<BTreeMap<String, String>, InferenceError> {
        let bundle = self
            .backend
            .generate_subtitles(buffer, descriptor, languages)
            .await?;
        Ok(bundle.subtitles)
    }
}

fn per_language(languages: &[String], line: &str) -> BTreeMap<String, String> {
    languages
        .iter()
        .map(|lang| (lang.clone(), line.to_string()))
        .collect()
}
