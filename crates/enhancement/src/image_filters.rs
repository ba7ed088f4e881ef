use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use imageproc::filter::median_filter;
use media_insight_common::{MediaDescriptor, MediaType};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::{build_report, EnhancementError, EnhancementReport};

const UPSCALE_FACTOR: f32 = 1.5;
const UNSHARP_SIGMA: f32 = 1.2;
const UNSHARP_THRESHOLD: i32 = 4;
const MEDIAN_RADIUS: u32 = 1;

pub(crate) fn enhance_image(
    input: &Path,
    descriptor: &MediaDescriptor,
    output_dir: &Path,
) -> Result<EnhancementReport, EnhancementError> {
    let img = image::open(input).map_err(|e| EnhancementError::Undecodable {
        media_type: MediaType::Image,
        reason: e.to_string(),
    })?;
    let (width, height) = img.dimensions();
    debug!("Decoded {}x{} image from {}", width, height, input.display());

    let detailed = img.unsharpen(UNSHARP_SIGMA, UNSHARP_THRESHOLD).to_rgba8();
    let denoised = median_filter(&detailed, MEDIAN_RADIUS, MEDIAN_RADIUS);

    let new_width = ((width as f32) * UPSCALE_FACTOR).round().max(1.0) as u32;
    let new_height = ((height as f32) * UPSCALE_FACTOR).round().max(1.0) as u32;
    let upscaled = image::imageops::resize(&denoised, new_width, new_height, FilterType::CatmullRom);

    let extension = descriptor.extension.trim_start_matches('.');
    let format = ImageFormat::from_extension(extension)
        .filter(|f| {
            matches!(
                f,
                ImageFormat::Png
                    | ImageFormat::Jpeg
                    | ImageFormat::Bmp
                    | ImageFormat::Tiff
                    | ImageFormat::WebP
                    | ImageFormat::Gif
            )
        })
        .unwrap_or(ImageFormat::Png);
    let output_path = output_dir.join(format!("enhanced.{}", format.extensions_str()[0]));

    let output = DynamicImage::ImageRgba8(upscaled);
    let output = if format == ImageFormat::Jpeg {
        DynamicImage::ImageRgb8(output.to_rgb8())
    } else {
        output
    };
    output
        .save_with_format(&output_path, format)
        .map_err(|e| EnhancementError::Encode(e.to_string()))?;

    let mime_type = if descriptor.mime_type.starts_with("image/") {
        descriptor.mime_type.clone()
    } else {
        format.to_mime_type().to_string()
    };

    let mut metrics = BTreeMap::new();
    metrics.insert(
        "resolution".to_string(),
        serde_json::json!(format!("{new_width}x{new_height}")),
    );

    build_report(
        output_path,
        &[
            "Applied unsharp-mask detail enhancement and median noise reduction",
            "Upscaled 1.5x with Catmull-Rom resampling",
        ],
        mime_type,
        metrics,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use media_insight_common::detect_media_type;

    #[test]
    fn test_enhance_png_upscales() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.png");
        let img = RgbImage::from_fn(10, 8, |x, y| Rgb([(x * 20) as u8, (y * 30) as u8, 128]));
        img.save(&input).unwrap();

        let descriptor = detect_media_type("input.png", None);
        let report = enhance_image(&input, &descriptor, dir.path()).unwrap();

        assert_eq!(report.file_name, "enhanced.png");
        assert_eq!(report.mime_type, "image/png");
        assert_eq!(report.metrics["resolution"], "15x12");
        assert!(!report.encoded_output.is_empty());
        assert_eq!(image::image_dimensions(&report.output_path).unwrap(), (15, 12));
    }

    #[test]
    fn test_enhance_jpeg_keeps_format() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.jpg");
        RgbImage::from_pixel(4, 4, Rgb([200, 10, 10])).save(&input).unwrap();

        let descriptor = detect_media_type("input.jpg", None);
        let report = enhance_image(&input, &descriptor, dir.path()).unwrap();
        assert_eq!(report.file_name, "enhanced.jpg");
        assert_eq!(report.mime_type, "image/jpeg");
    }

    #[test]
    fn test_corrupted_image_is_undecodable() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.png");
        std::fs::write(&input, b"definitely not an image").unwrap();

        let descriptor = detect_media_type("broken.png", None);
        let err = enhance_image(&input, &descriptor, dir.path()).unwrap_err();
        assert!(matches!(
            err,
            EnhancementError::Undecodable {
                media_type: MediaType::Image,
                ..
            }
        ));
    }
}
