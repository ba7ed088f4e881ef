//! Live transcription sessions
//!
//! A session accumulates raw media chunks in one buffer file. After every
//! chunk the whole buffer is transcribed again and reduced to the latest
//! line per language; stopping a session returns the full subtitles.

mod session;
mod srt;
mod transcriber;

use thiserror::Error;

pub use session::{
    is_valid_session_id, SessionFinished, SessionManager, SessionSnapshot, SessionStarted,
    TranscriptUpdate, DEFAULT_SESSION_LANGUAGES, DEFAULT_SESSION_MIME,
};
pub use srt::latest_line;
pub use transcriber::{StreamingTranscriber, UNCONFIGURED_TRANSCRIPT};

/// Session errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid session id: {0:?}")]
    InvalidId(String),

    #[error("Session {0} is already active")]
    AlreadyActive(String),

    #[error("Session buffer error: {0}")]
    Buffer(#[from] std::io::Error),
}
