//! Classification of requested capability labels into an execution plan

use serde::Serialize;

/// Labels answered by the combined synchronous analysis
pub const ANALYSIS_LABELS: &[&str] = &["auto_tag", "scene", "emotion", "understanding", "recommendation"];
pub const MODERATION_LABELS: &[&str] = &["moderation", "audit", "safety"];
pub const SUBTITLE_LABELS: &[&str] = &["subtitles", "caption", "transcription"];
pub const ENHANCEMENT_LABELS: &[&str] = &["enhancement", "restore", "super_resolution", "denoise"];

/// Task list assumed when a request names none
pub const DEFAULT_TASKS: &[&str] = &["auto_tag", "scene", "emotion", "moderation"];
/// Languages assumed when an analysis request names none
pub const DEFAULT_LANGUAGES: &[&str] = &["zh", "en"];

/// Which operations one request needs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPlan {
    pub synchronous_analysis_requested: bool,
    pub moderation_requested: bool,
    pub subtitles_requested: bool,
    pub enhancement_requested: bool,
}

impl TaskPlan {
    /// Classify `labels`; an empty set means the default full analysis plus moderation
    ///
    /// Matching ignores case and surrounding whitespace. Labels outside every
    /// known set have no effect.
    #[must_use]
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        let normalized: Vec<String> = labels
            .iter()
            .map(|l| l.as_ref().trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .collect();

        if normalized.is_empty() {
            return Self::from_labels(DEFAULT_TASKS);
        }

        let any_in = |set: &[&str]| normalized.iter().any(|l| set.contains(&l.as_str()));
        Self {
            synchronous_analysis_requested: any_in(ANALYSIS_LABELS),
            moderation_requested: any_in(MODERATION_LABELS),
            subtitles_requested: any_in(SUBTITLE_LABELS),
            enhancement_requested: any_in(ENHANCEMENT_LABELS),
        }
    }

    /// Whether the combined analyze call has to run
    #[must_use]
    pub fn needs_analysis_call(&self) -> bool {
        self.synchronous_analysis_requested || self.moderation_requested
    }

    /// Number of background jobs this plan submits
    #[must_use]
    pub fn job_count(&self) -> usize {
        usize::from(self.subtitles_requested) + usize::from(self.enhancement_requested)
    }
}

/// Parse a list field given as a JSON array string or comma-separated text
///
/// Blank input yields an empty list. Entries are trimmed and empty entries dropped.
#[must_use]
pub fn parse_list_field(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    if raw.starts_with('[') {
        if let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(raw) {
            return values
                .into_iter()
                .filter_map(|v| match v {
                    serde_json::Value::String(s) => Some(s),
                    serde_json::Value::Null => None,
                    other => Some(other.to_string()),
                })
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }

    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Requested tasks, or [`DEFAULT_TASKS`] when none were given
#[must_use]
pub fn resolve_tasks(requested: Vec<String>) -> Vec<String> {
    if requested.is_empty() {
        DEFAULT_TASKS.iter().map(|s| (*s).to_string()).collect()
    } else {
        requested
    }
}

/// Requested languages, or `defaults` when none were given
#[must_use]
pub fn resolve_languages(requested: Vec<String>, defaults: &[&str]) -> Vec<String> {
    if requested.is_empty() {
        defaults.iter().map(|s| (*s).to_string()).collect()
    } else {
        requested
    }
}
