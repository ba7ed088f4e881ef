use chrono::{DateTime, Utc};
use media_insight_common::{detect_media_type, MediaDescriptor};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::transcriber::StreamingTranscriber;
use crate::SessionError;

/// MIME type assumed when a start event names none
pub const DEFAULT_SESSION_MIME: &str = "audio/webm";
/// Languages assumed when a start event names none
pub const DEFAULT_SESSION_LANGUAGES: &[&str] = &["zh"];

const MAX_SESSION_ID_LEN: usize = 128;

/// Whether a caller-supplied id is safe to use as a buffer file name
#[must_use]
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Acknowledgement of a started session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStarted {
    pub session_id: String,
    pub languages: Vec<String>,
}

/// Incremental transcript after one chunk
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptUpdate {
    pub session_id: String,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    /// Latest line per language
    pub transcript: BTreeMap<String, String>,
}

/// Outcome of stopping a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFinished {
    pub session_id: String,
    pub completed: bool,
    /// Full SRT per language
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitles: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Point-in-time view of a live session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub buffer_path: PathBuf,
    pub languages: Vec<String>,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub descriptor: MediaDescriptor,
}

struct SessionState {
    descriptor: MediaDescriptor,
    last_activity: Instant,
    /// Set once the session left the live set; later chunks are dropped
    closed: bool,
}

struct Session {
    id: String,
    buffer_path: PathBuf,
    languages: Vec<String>,
    owner: String,
    created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
}

/// Live streaming sessions keyed by id
///
/// Each session's state sits behind its own lock, held for the whole
/// append + transcribe of a chunk, so chunks of one session are processed
/// strictly in arrival order while separate sessions proceed independently.
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<Mutex<HashMap<String, Arc<Session>>>>,
    buffer_dir: PathBuf,
    transcriber: StreamingTranscriber,
}

impl SessionManager {
    /// Manager writing session buffers into `buffer_dir`
    pub fn new(buffer_dir: impl Into<PathBuf>, transcriber: StreamingTranscriber) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            buffer_dir: buffer_dir.into(),
            transcriber,
        }
    }

    #[must_use]
    pub fn buffer_dir(&self) -> &Path {
        &self.buffer_dir
    }

    /// Start a session, generating an id when none is given
    ///
    /// Every session gets a fresh empty buffer `{buffer_dir}/{id}_{nonce}.webm`,
    /// so an id restarted while its previous session is still finalizing
    /// never touches the old buffer.
    pub async fn start(
        &self,
        session_id: Option<String>,
        languages: Vec<String>,
        mime_type: Option<&str>,
        owner: &str,
    ) -> Result<SessionStarted, SessionError> {
        let id = match session_id.filter(|id| !id.is_empty()) {
            Some(id) if is_valid_session_id(&id) => id,
            Some(id) => return Err(SessionError::InvalidId(id)),
            None => uuid::Uuid::new_v4().simple().to_string(),
        };
        let languages = if languages.is_empty() {
            DEFAULT_SESSION_LANGUAGES
                .iter()
                .map(|s| (*s).to_string())
                .collect()
        } else {
            languages
        };
        let mime_type = mime_type
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_SESSION_MIME);

        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&id) {
            return Err(SessionError::AlreadyActive(id));
        }

        let buffer_path = self
            .buffer_dir
            .join(format!("{id}_{}.webm", uuid::Uuid::new_v4().simple()));
        tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&buffer_path)
            .await?;

        let descriptor = detect_media_type(&format!("{id}.webm"), Some(mime_type));
        sessions.insert(
            id.clone(),
            Arc::new(Session {
                id: id.clone(),
                buffer_path,
                languages: languages.clone(),
                owner: owner.to_string(),
                created_at: Utc::now(),
                state: Mutex::new(SessionState {
                    descriptor,
                    last_activity: Instant::now(),
                    closed: false,
                }),
            }),
        );
        info!("Started realtime session {} ({:?})", id, languages);

        Ok(SessionStarted {
            session_id: id,
            languages,
        })
    }

    async fn live(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.lock().await.get(session_id).cloned()
    }

    /// Append one chunk and transcribe the whole buffer so far
    ///
    /// Returns `Ok(None)` for unknown or already stopped sessions. A write
    /// failure is returned as an error and leaves the session active.
    pub async fn append_chunk(
        &self,
        session_id: &str,
        chunk: &[u8],
    ) -> Result<Option<TranscriptUpdate>, SessionError> {
        let Some(session) = self.live(session_id).await else {
            debug!("Dropping chunk for inactive session {}", session_id);
            return Ok(None);
        };
        self.append_to(&session, chunk).await
    }

    /// [`append_chunk`](Self::append_chunk) on behalf of `owner`; chunks
    /// from any other connection are dropped
    pub async fn append_chunk_from(
        &self,
        owner: &str,
        session_id: &str,
        chunk: &[u8],
    ) -> Result<Option<TranscriptUpdate>, SessionError> {
        let Some(session) = self.live(session_id).await else {
            debug!("Dropping chunk for inactive session {}", session_id);
            return Ok(None);
        };
        if session.owner != owner {
            warn!("Dropping chunk for session {} from {}", session_id, owner);
            return Ok(None);
        }
        self.append_to(&session, chunk).await
    }

    async fn append_to(
        &self,
        session: &Session,
        chunk: &[u8],
    ) -> Result<Option<TranscriptUpdate>, SessionError> {

        let mut state = session.state.lock().await;
        if state.closed {
            debug!("Dropping late chunk for stopped session {}", session.id);
            return Ok(None);
        }

        let mut sink = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&session.buffer_path)
            .await?;
        sink.write_all(chunk).await?;
        sink.flush().await?;
        state.descriptor.size_bytes = tokio::fs::metadata(&session.buffer_path).await?.len();
        state.last_activity = Instant::now();

        let transcript = self
            .transcriber
            .incremental(&session.buffer_path, &state.descriptor, &session.languages)
            .await;

        Ok(Some(TranscriptUpdate {
            session_id: session.id.clone(),
            timestamp: Utc::now().timestamp_millis() as f64 / 1000.0,
            transcript,
        }))
    }

    /// Finalize a session with one full-buffer transcription
    ///
    /// Unknown or already stopped ids yield `None`. The buffer is deleted
    /// afterwards.
    pub async fn stop(&self, session_id: &str) -> Option<SessionFinished> {
        let session = self.sessions.lock().await.remove(session_id)?;
        Some(self.finish(session).await)
    }

    /// [`stop`](Self::stop) on behalf of `owner`; sessions of other
    /// connections are left running
    pub async fn stop_from(&self, owner: &str, session_id: &str) -> Option<SessionFinished> {
        let session = {
            let mut sessions = self.sessions.lock().await;
            if sessions.get(session_id)?.owner != owner {
                warn!("Ignoring stop of session {} from {}", session_id, owner);
                return None;
            }
            sessions.remove(session_id)?
        };
        Some(self.finish(session).await)
    }

    async fn finish(&self, session: Arc<Session>) -> SessionFinished {
        let session_id = session.id.as_str();

        // Waits for an in-flight chunk of this session to finish
        let mut state = session.state.lock().await;
        state.closed = true;
        let outcome = self
            .transcriber
            .finalize(&session.buffer_path, &state.descriptor, &session.languages)
            .await;
        drop(state);

        discard_buffer(&session.buffer_path).await;

        let (subtitles, error) = match outcome {
            Ok(subtitles) => (Some(subtitles), None),
            Err(e) => {
                warn!("Final transcription failed for session {}: {}", session_id, e);
                (None, Some(e.to_string()))
            }
        };
        info!("Stopped realtime session {}", session_id);

        SessionFinished {
            session_id: session.id.clone(),
            completed: true,
            subtitles,
            error,
        }
    }

    /// Discard every session owned by `owner` without a final transcription
    pub async fn remove_owned_by(&self, owner: &str) -> usize {
        let removed: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.lock().await;
            let ids: Vec<String> = sessions
                .values()
                .filter(|s| s.owner == owner)
                .map(|s| s.id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        for session in &removed {
            close(session).await;
        }
        if !removed.is_empty() {
            info!("Discarded {} sessions of {}", removed.len(), owner);
        }
        removed.len()
    }

    /// Discard sessions with no chunk activity for longer than `max_idle`
    ///
    /// Sessions busy with a chunk are never idle.
    pub async fn expire_idle(&self, max_idle: Duration) -> usize {
        let expired: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.lock().await;
            let ids: Vec<String> = sessions
                .values()
                .filter(|s| match s.state.try_lock() {
                    Ok(state) => state.last_activity.elapsed() > max_idle,
                    Err(_) => false,
                })
                .map(|s| s.id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        for session in &expired {
            close(session).await;
        }
        if !expired.is_empty() {
            info!("Expired {} idle sessions", expired.len());
        }
        expired.len()
    }

    /// Snapshot of a live session
    pub async fn get(&self, session_id: &str) -> Option<SessionSnapshot> {
        let session = self.live(session_id).await?;
        let state = session.state.lock().await;
        Some(SessionSnapshot {
            session_id: session.id.clone(),
            buffer_path: session.buffer_path.clone(),
            languages: session.languages.clone(),
            owner: session.owner.clone(),
            created_at: session.created_at,
            descriptor: state.descriptor.clone(),
        })
    }

    /// Whether `session_id` is in the live set
    pub async fn is_active(&self, session_id: &str) -> bool {
        self.sessions.lock().await.contains_key(session_id)
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

async fn close(session: &Session) {
    session.state.lock().await.closed = true;
    discard_buffer(&session.buffer_path).await;
    debug!("Closed realtime session {}", session.id);
}

async fn discard_buffer(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove session buffer {}: {}", path.display(), e);
        }
    }
}
