use media_insight_common::{MediaDescriptor, MediaType};
use std::collections::BTreeMap;
use std::f32::consts::PI;
use std::path::Path;
use std::process::Command;
use tracing::debug;

use crate::{build_report, EnhancementError, EnhancementReport};

const HIGH_PASS_HZ: f32 = 80.0;
const LOW_PASS_HZ: f32 = 16_000.0;
/// 1 dB of headroom below full scale
const TARGET_PEAK: f32 = 0.891_250_9;

const STEPS: &[&str] = &[
    "Normalized loudness to flatten the dynamic range",
    "Filtered low-frequency hum and high-frequency hiss",
];

pub(crate) fn enhance_audio(
    input: &Path,
    descriptor: &MediaDescriptor,
    output_dir: &Path,
) -> Result<EnhancementReport, EnhancementError> {
    if descriptor.extension == ".wav" {
        enhance_wav(input, output_dir)
    } else {
        enhance_with_ffmpeg(input, descriptor, output_dir)
    }
}

fn undecodable(reason: impl ToString) -> EnhancementError {
    EnhancementError::Undecodable {
        media_type: MediaType::Audio,
        reason: reason.to_string(),
    }
}

fn enhance_wav(input: &Path, output_dir: &Path) -> Result<EnhancementReport, EnhancementError> {
    let mut reader = hound::WavReader::open(input).map_err(undecodable)?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let mut samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<_, _>>()
                .map_err(undecodable)?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(undecodable)?,
    };

    debug!(
        "Filtering {} samples ({} ch @ {} Hz)",
        samples.len(),
        channels,
        spec.sample_rate
    );
    let sample_rate = spec.sample_rate as f32;
    for channel in 0..channels {
        high_pass(&mut samples, channel, channels, HIGH_PASS_HZ, sample_rate);
        if LOW_PASS_HZ < sample_rate / 2.0 {
            low_pass(&mut samples, channel, channels, LOW_PASS_HZ, sample_rate);
        }
    }
    normalize_peak(&mut samples, TARGET_PEAK);

    let output_path = output_dir.join("enhanced.wav");
    let out_spec = hound::WavSpec {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&output_path, out_spec)
        .map_err(|e| EnhancementError::Encode(e.to_string()))?;
    for sample in &samples {
        let value = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16;
        writer
            .write_sample(value)
            .map_err(|e| EnhancementError::Encode(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| EnhancementError::Encode(e.to_string()))?;

    let frames = samples.len() / channels;
    let duration = frames as f64 / f64::from(spec.sample_rate.max(1));
    let mut metrics = BTreeMap::new();
    metrics.insert(
        "duration".to_string(),
        serde_json::json!(format!("{duration:.2} s")),
    );

    build_report(output_path, STEPS, "audio/wav".to_string(), metrics)
}

/// One-pole RC high-pass over one interleaved channel
fn high_pass(samples: &mut [f32], channel: usize, stride: usize, cutoff: f32, sample_rate: f32) {
    let rc = 1.0 / (2.0 * PI * cutoff);
    let dt = 1.0 / sample_rate;
    let alpha = rc / (rc + dt);

    let mut prev_in = 0.0;
    let mut prev_out = 0.0;
    for sample in samples.iter_mut().skip(channel).step_by(stride) {
        let current = *sample;
        let out = alpha * (prev_out + current - prev_in);
        prev_in = current;
        prev_out = out;
        *sample = out;
    }
}

/// One-pole RC low-pass over one interleaved channel
fn low_pass(samples: &mut [f32], channel: usize, stride: usize, cutoff: f32, sample_rate: f32) {
    let rc = 1.0 / (2.0 * PI * cutoff);
    let dt = 1.0 / sample_rate;
    let alpha = dt / (rc + dt);

    let mut prev_out = 0.0;
    for sample in samples.iter_mut().skip(channel).step_by(stride) {
        prev_out += alpha * (*sample - prev_out);
        *sample = prev_out;
    }
}

/// Scale so the loudest sample sits at `target`; silence is left untouched
fn normalize_peak(samples: &mut [f32], target: f32) {
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak <= f32::EPSILON {
        return;
    }
    let gain = target / peak;
    for sample in samples.iter_mut() {
        *sample *= gain;
    }
}

fn enhance_with_ffmpeg(
    input: &Path,
    descriptor: &MediaDescriptor,
    output_dir: &Path,
) -> Result<EnhancementReport, EnhancementError> {
    let extension = if descriptor.extension.is_empty() {
        ".wav"
    } else {
        descriptor.extension.as_str()
    };
    let output_path = output_dir.join(format!("enhanced{extension}"));

    let output = Command::new("ffmpeg")
        .args(["-y", "-v", "error", "-i"])
        .arg(input)
        .args([
            "-af",
            &format!("loudnorm,highpass=f={HIGH_PASS_HZ},lowpass=f={LOW_PASS_HZ}"),
        ])
        .arg(&output_path)
        .output()
        .map_err(|e| EnhancementError::Ffmpeg(format!("Failed to run ffmpeg: {e}")))?;

    if !output.status.success() {
        return Err(undecodable(String::from_utf8_lossy(&output.stderr).trim()));
    }

    build_report(
        output_path,
        STEPS,
        descriptor.mime_type.clone(),
        BTreeMap::new(),
    )
}
