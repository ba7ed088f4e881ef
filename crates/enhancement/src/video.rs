use media_insight_common::{probe_video, MediaType};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::Path;
use std::process::Command;
use tracing::warn;

use crate::{build_report, EnhancementError, EnhancementReport};

/// Non-local-means-style denoise, sharpening kernel, then a 1:9 blend with
/// the previous frame to damp jitter
const VIDEO_FILTER: &str = "hqdn3d=4:3:6:4.5,unsharp=5:5:1.0:5:5:0.0,tmix=frames=2:weights='1 9'";

fn ffmpeg_args(input: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-y", "-v", "error", "-i"]
        .iter()
        .map(OsString::from)
        .collect();
    args.push(input.as_os_str().to_owned());
    args.extend(
        [
            "-vf",
            VIDEO_FILTER,
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-c:a",
            "aac",
        ]
        .iter()
        .map(OsString::from),
    );
    args.push(output.as_os_str().to_owned());
    args
}

pub(crate) fn enhance_video(
    input: &Path,
    output_dir: &Path,
) -> Result<EnhancementReport, EnhancementError> {
    let probe = probe_video(input).map_err(|e| EnhancementError::Undecodable {
        media_type: MediaType::Video,
        reason: e.to_string(),
    })?;

    let output_path = output_dir.join("enhanced.mp4");
    let output = Command::new("ffmpeg")
        .args(ffmpeg_args(input, &output_path))
        .output()
        .map_err(|e| EnhancementError::Ffmpeg(format!("Failed to run ffmpeg: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!("ffmpeg failed for {}: {}", input.display(), stderr.trim());
        return Err(EnhancementError::Ffmpeg(stderr.trim().to_string()));
    }

    let mut metrics = BTreeMap::new();
    metrics.insert(
        "frames".to_string(),
        serde_json::json!((probe.duration * probe.fps).round() as u64),
    );
    metrics.insert("fps".to_string(), serde_json::json!(probe.fps));
    metrics.insert(
        "resolution".to_string(),
        serde_json::json!(format!("{}x{}", probe.width, probe.height)),
    );

    build_report(
        output_path,
        &[
            "Applied spatio-temporal denoising to reduce video noise",
            "Sharpened details with an unsharp convolution",
            "Smoothed frame-to-frame jitter with weighted blending",
        ],
        "video/mp4".to_string(),
        metrics,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffmpeg_args_order() {
        let args = ffmpeg_args(Path::new("/in/clip.mov"), Path::new("/out/enhanced.mp4"));
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(args[0], "-y");
        assert_eq!(args[4], "/in/clip.mov");
        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert_eq!(args[vf + 1], VIDEO_FILTER);
        assert_eq!(args.last().unwrap(), "/out/enhanced.mp4");
    }

    #[test]
    fn test_unprobeable_video_is_undecodable() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("fake.mp4");
        std::fs::write(&input, b"not a video").unwrap();

        // Holds whether or not ffprobe is installed: either it fails to run or rejects the file
        let err = enhance_video(&input, dir.path()).unwrap_err();
        assert!(matches!(
            err,
            EnhancementError::Undecodable {
                media_type: MediaType::Video,
                ..
            }
        ));
    }
}
