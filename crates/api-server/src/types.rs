//! API request and response types

use media_insight_orchestrator::parse_list_field;
use media_insight_streaming::{SessionFinished, SessionStarted, TranscriptUpdate};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Capability switches advertised to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlags {
    pub analysis: bool,
    pub moderation: bool,
    pub subtitles: bool,
    pub realtime_subtitles: bool,
    pub enhancement: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigResponse {
    /// Whether a live inference backend is configured
    pub configured: bool,
    pub features: FeatureFlags,
}

/// Events sent by a realtime client
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event")]
pub enum ClientEvent {
    #[serde(rename = "ai-realtime-start", rename_all = "camelCase")]
    Start {
        #[serde(default)]
        session_id: Option<String>,
        /// Array, JSON array string or comma-separated string
        #[serde(default)]
        languages: Option<serde_json::Value>,
        #[serde(default)]
        mime_type: Option<String>,
    },

    #[serde(rename = "ai-realtime-chunk", rename_all = "camelCase")]
    Chunk {
        #[serde(default)]
        session_id: Option<String>,
        /// Base64 media bytes
        #[serde(default)]
        chunk: Option<String>,
    },

    #[serde(rename = "ai-realtime-stop", rename_all = "camelCase")]
    Stop {
        #[serde(default)]
        session_id: Option<String>,
    },
}

/// Events sent to a realtime client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum ServerEvent {
    #[serde(rename = "ai-realtime-started")]
    Started(SessionStarted),

    #[serde(rename = "ai-realtime-transcript")]
    Transcript(TranscriptUpdate),

    #[serde(rename = "ai-realtime-finished")]
    Finished(SessionFinished),

    #[serde(rename = "ai-realtime-error", rename_all = "camelCase")]
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        error: String,
    },
}

/// Flatten a list given as an array or as list-field text
#[must_use]
pub fn list_value(value: Option<&serde_json::Value>) -> Vec<String> {
    match value {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) => Some(s.trim().to_string()),
                serde_json::Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(serde_json::Value::String(raw)) => parse_list_field(raw),
        _ => Vec::new(),
    }
}
