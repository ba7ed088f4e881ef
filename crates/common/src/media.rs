//! Media type detection
//!
//! Classifies an upload as image, video, or audio from its file name and the
//! MIME type reported by the client. Extension matches win over MIME prefixes.

use serde::{Deserialize, Serialize};
use std::path::Path;

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp", ".gif", ".bmp", ".tiff"];
const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".mov", ".avi", ".mkv", ".webm", ".flv", ".m4v"];
const AUDIO_EXTENSIONS: &[&str] = &[".mp3", ".wav", ".ogg", ".flac", ".aac", ".m4a", ".wma"];

/// Extension to MIME table used for guessing in both directions.
/// The first entry for a MIME type is its canonical extension.
const MIME_TABLE: &[(&str, &str)] = &[
    (".jpg", "image/jpeg"),
    (".jpeg", "image/jpeg"),
    (".png", "image/png"),
    (".webp", "image/webp"),
    (".gif", "image/gif"),
    (".bmp", "image/bmp"),
    (".tiff", "image/tiff"),
    (".mp4", "video/mp4"),
    (".mov", "video/quicktime"),
    (".avi", "video/x-msvideo"),
    (".mkv", "video/x-matroska"),
    (".webm", "video/webm"),
    (".flv", "video/x-flv"),
    (".m4v", "video/x-m4v"),
    (".mp3", "audio/mpeg"),
    (".wav", "audio/wav"),
    (".wav", "audio/x-wav"),
    (".ogg", "audio/ogg"),
    (".flac", "audio/flac"),
    (".aac", "audio/aac"),
    (".m4a", "audio/mp4"),
    (".wma", "audio/x-ms-wma"),
    (".webm", "audio/webm"),
];

/// High-level media category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Audio,
    Unknown,
}

impl MediaType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type and size metadata for a piece of media
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDescriptor {
    pub media_type: MediaType,
    pub mime_type: String,
    /// Lowercase extension including the leading dot, or empty
    pub extension: String,
    pub size_bytes: u64,
}

/// Infer the media descriptor for a file name and optional client MIME type
#[must_use]
pub fn detect_media_type(file_name: &str, mime_type: Option<&str>) -> MediaDescriptor {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default();

    let mime = mime_type
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .or_else(|| guess_mime(&extension).map(str::to_string))
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let ext = extension.as_str();
    let media_type = if IMAGE_EXTENSIONS.contains(&ext) || mime.starts_with("image/") {
        MediaType::Image
    } else if VIDEO_EXTENSIONS.contains(&ext) || mime.starts_with("video/") {
        MediaType::Video
    } else if AUDIO_EXTENSIONS.contains(&ext) || mime.starts_with("audio/") {
        MediaType::Audio
    } else {
        MediaType::Unknown
    };

    let extension = if extension.is_empty() {
        guess_extension(&mime).unwrap_or_default().to_string()
    } else {
        extension
    };

    MediaDescriptor {
        media_type,
        mime_type: mime,
        extension,
        size_bytes: 0,
    }
}

fn guess_mime(extension: &str) -> Option<&'static str> {
    MIME_TABLE
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
}

fn guess_extension(mime: &str) -> Option<&'static str> {
    let essence = mime.split(';').next().unwrap_or(mime).trim();
    MIME_TABLE
        .iter()
        .find(|(_, m)| m.eq_ignore_ascii_case(essence))
        .map(|(ext, _)| *ext)
}

/// Reduce a client-supplied file name to a safe single path component
///
/// Directory parts are dropped, whitespace becomes `_`, and anything outside
/// ASCII alphanumerics, `.`, `-` and `_` is removed. Leading dots are stripped
/// so the result can never be `..` or a hidden file.
#[must_use]
pub fn secure_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();

    cleaned.trim_start_matches('.').to_string()
}
