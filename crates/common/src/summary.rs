//! Media sampling and lightweight metadata summaries
//!
//! The inference backend never receives whole files: it gets a base64 prefix
//! capped at [`DEFAULT_SAMPLE_BYTES`] plus a short textual summary built here.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::GenericImageView;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::process::Command;
use tracing::debug;

use crate::{MediaDescriptor, MediaType, ProcessingError, Result};

/// Maximum number of leading bytes sent to the inference backend
pub const DEFAULT_SAMPLE_BYTES: usize = 2 * 1024 * 1024;

/// Return a base64-encoded prefix of the file capped at `max_bytes`, plus the total size
pub fn encode_file_sample(path: &Path, max_bytes: usize) -> Result<(String, u64)> {
    let total_size = std::fs::metadata(path)?.len();
    let mut sample = Vec::with_capacity(max_bytes.min(total_size as usize));
    File::open(path)?
        .take(max_bytes as u64)
        .read_to_end(&mut sample)?;
    Ok((STANDARD.encode(&sample), total_size))
}

/// Format a byte count with binary units (`"1.50 KB"`)
#[must_use]
pub fn human_file_size(size: u64) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];
    if size == 0 {
        return "0 Bytes".to_string();
    }
    let mut idx = 0;
    let mut scaled = size as f64;
    while scaled >= 1024.0 && idx < UNITS.len() - 1 {
        scaled /= 1024.0;
        idx += 1;
    }
    format!("{scaled:.2} {}", UNITS[idx])
}

/// Video stream properties reported by ffprobe
#[derive(Debug, Clone, PartialEq)]
pub struct VideoProbe {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration: f64,
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Probe the first video stream of a file with ffprobe
pub fn probe_video(path: &Path) -> Result<VideoProbe> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate:format=duration",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| ProcessingError::FFmpegError(format!("Failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(ProcessingError::FFmpegError(format!(
            "ffprobe exited with {} for {}",
            output.status,
            path.display()
        )));
    }

    let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)
        .map_err(|e| ProcessingError::FFmpegError(format!("Unreadable ffprobe output: {e}")))?;
    let stream = parsed
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| ProcessingError::UnsupportedFormat("No video stream found".to_string()))?;

    let fps = stream
        .r_frame_rate
        .as_deref()
        .map(parse_frame_rate)
        .unwrap_or(0.0);
    let duration = parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(VideoProbe {
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
        fps,
        duration,
    })
}

/// Parse ffprobe rationals such as `30000/1001`
fn parse_frame_rate(rate: &str) -> f64 {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().unwrap_or(0.0);
            let den: f64 = den.trim().parse().unwrap_or(0.0);
            if den == 0.0 {
                0.0
            } else {
                num / den
            }
        }
        None => rate.trim().parse().unwrap_or(0.0),
    }
}

/// Produce a short textual summary of the media using lightweight heuristics
///
/// Refreshes `descriptor.size_bytes` from disk. Metadata extraction failures
/// are written into the summary instead of being returned.
pub fn summarize_media(path: &Path, descriptor: &mut MediaDescriptor) -> Result<String> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let size_bytes = std::fs::metadata(path)?.len();
    descriptor.size_bytes = size_bytes;

    let mut parts = vec![
        format!("File name: {file_name}"),
        format!("Type: {}", descriptor.media_type),
        format!("MIME: {}", descriptor.mime_type),
        format!("Size: {}", human_file_size(size_bytes)),
    ];

    match descriptor.media_type {
        MediaType::Image => match image::open(path) {
            Ok(img) => {
                let (width, height) = img.dimensions();
                parts.push(format!("Resolution: {width}x{height}"));
                parts.push(format!("Color type: {:?}", img.color()));
            }
            Err(e) => parts.push(format!("Image metadata unavailable: {e}")),
        },
        MediaType::Audio => match hound::WavReader::open(path) {
            Ok(reader) => {
                let spec = reader.spec();
                let duration = f64::from(reader.duration()) / f64::from(spec.sample_rate.max(1));
                parts.push(format!("Channels: {}", spec.channels));
                parts.push(format!("Sample rate: {} Hz", spec.sample_rate));
                parts.push(format!("Duration: {duration:.2} s"));
            }
            Err(e) => parts.push(format!("Audio metadata unavailable: {e}")),
        },
        MediaType::Video => match probe_video(path) {
            Ok(probe) => {
                parts.push(format!("Resolution: {}x{}", probe.width, probe.height));
                parts.push(format!("Frame rate: {:.2} FPS", probe.fps));
                parts.push(format!("Duration: {:.2} s", probe.duration));
            }
            Err(e) => parts.push(format!("Video metadata unavailable: {e}")),
        },
        MediaType::Unknown => {
            parts.push("Media type unknown; no detailed metadata available.".to_string());
        }
    }

    debug!("Summarized {} ({} lines)", path.display(), parts.len());
    Ok(parts.join("\n"))
}
