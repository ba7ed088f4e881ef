//! Payloads returned by the inference backend

use media_insight_common::MediaType;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Moderation risk classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Safe,
    Warning,
    Block,
    /// Anything the backend reports outside the three known levels
    #[default]
    #[serde(other)]
    Unknown,
}

/// Models answer `null` for missing fields as often as they omit them
fn deserialize_null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let opt = Option::<T>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

fn value_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// A single string, a list of strings, or null, joined into one string
fn deserialize_text_or_list<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(value_text)
            .collect::<Vec<_>>()
            .join("; "),
        other => value_text(other).unwrap_or_default(),
    })
}

/// A list of strings, a single string, or null
fn deserialize_list_or_text<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().filter_map(value_text).collect(),
        Value::String(s) if s.trim().is_empty() => Vec::new(),
        other => value_text(other).into_iter().collect(),
    })
}

/// Moderation verdict
///
/// The combined analysis embeds this as `{level, reasons, suggestions}` while
/// the dedicated moderation call answers `{riskLevel, reasons, guidance}`;
/// both shapes deserialize into the same struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationVerdict {
    #[serde(default, alias = "level", deserialize_with = "deserialize_null_as_default")]
    pub risk_level: RiskLevel,
    #[serde(default, deserialize_with = "deserialize_list_or_text")]
    pub reasons: Vec<String>,
    #[serde(default, alias = "suggestions", deserialize_with = "deserialize_text_or_list")]
    pub guidance: String,
}

/// Result of the combined tag / scene / emotion / moderation analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    #[serde(default, deserialize_with = "deserialize_list_or_text")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub scene: Option<String>,
    #[serde(default, deserialize_with = "deserialize_list_or_text")]
    pub emotions: Vec<String>,
    #[serde(default)]
    pub moderation: Option<ModerationVerdict>,
    #[serde(default, deserialize_with = "deserialize_list_or_text")]
    pub recommendations: Vec<String>,
    /// Per-language summaries keyed by language code
    #[serde(default, deserialize_with = "deserialize_null_as_default")]
    pub languages: BTreeMap<String, String>,
    /// Present when the backend volunteers subtitles alongside the analysis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitles: Option<BTreeMap<String, String>>,
    pub media_type: MediaType,
    #[serde(default)]
    pub file_size: u64,
    /// Any additional fields the backend returned
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Multi-language subtitles for one piece of media
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleBundle {
    pub media_type: MediaType,
    pub file_size: u64,
    /// SRT text keyed by language code
    pub subtitles: BTreeMap<String, String>,
}
