/// Common types and utilities shared by the media insight crates
use thiserror::Error;

mod media;
mod summary;

pub use media::{detect_media_type, secure_file_name, MediaDescriptor, MediaType};
pub use summary::{
    encode_file_sample, human_file_size, probe_video, summarize_media, VideoProbe,
    DEFAULT_SAMPLE_BYTES,
};

/// Processing errors
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Corrupted file: {0}")]
    CorruptedFile(String),

    #[error("FFmpeg error: {0}")]
    FFmpegError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    ImageError(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<image::ImageError> for ProcessingError {
    fn from(err: image::ImageError) -> Self {
        ProcessingError::ImageError(err.to_string())
    }
}

impl From<hound::Error> for ProcessingError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(e) => ProcessingError::IoError(e),
            other => ProcessingError::CorruptedFile(other.to_string()),
        }
    }
}

/// Result type for processing operations
pub type Result<T> = std::result::Result<T, ProcessingError>;
