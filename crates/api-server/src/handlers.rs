//! HTTP request handlers for API endpoints

use axum::{
    extract::{multipart::Field, Multipart, Path, State},
    response::IntoResponse,
    Json,
};
use media_insight_common::{detect_media_type, secure_file_name};
use media_insight_orchestrator::{
    parse_list_field, resolve_languages, resolve_tasks, AnalysisRequest, AnalysisResponse, Job,
    DEFAULT_LANGUAGES,
};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    types::{ConfigResponse, FeatureFlags, HealthResponse},
    ApiError, ApiState,
};

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Backend configuration and feature switches
pub async fn ai_config(State(state): State<ApiState>) -> impl IntoResponse {
    Json(ConfigResponse {
        configured: state.aggregator.backend().is_configured(),
        features: FeatureFlags {
            analysis: true,
            moderation: true,
            subtitles: true,
            realtime_subtitles: true,
            enhancement: true,
        },
    })
}

struct StoredUpload {
    file_name: String,
    mime_type: Option<String>,
    path: PathBuf,
    size: u64,
}

/// Analyze one uploaded file
///
/// Multipart fields: `file`, plus optional `tasks` and `languages`, each
/// repeated or given as a JSON array / comma-separated string.
pub async fn analyze(
    State(state): State<ApiState>,
    mut multipart: Multipart,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let mut form = AnalyzeForm::default();
    if let Err(e) = read_form(&state, &mut multipart, &mut form).await {
        if let Some(upload) = &form.upload {
            discard(&upload.path).await;
        }
        return Err(e);
    }
    let AnalyzeForm {
        upload,
        tasks,
        languages,
    } = form;

    let Some(upload) = upload else {
        return Err(ApiError::BadRequest("Missing file upload".to_string()));
    };

    let mut descriptor = detect_media_type(&upload.file_name, upload.mime_type.as_deref());
    descriptor.size_bytes = upload.size;
    info!(
        "Analyze request for {} ({}, {} bytes)",
        upload.file_name, descriptor.media_type, upload.size
    );

    let response = state
        .aggregator
        .run(AnalysisRequest {
            file_name: upload.file_name,
            media_path: upload.path,
            descriptor,
            tasks: resolve_tasks(tasks),
            languages: resolve_languages(languages, DEFAULT_LANGUAGES),
            remove_when_done: true,
        })
        .await?;

    Ok(Json(response))
}

#[derive(Default)]
struct AnalyzeForm {
    upload: Option<StoredUpload>,
    tasks: Vec<String>,
    languages: Vec<String>,
}

async fn read_form(
    state: &ApiState,
    multipart: &mut Multipart,
    form: &mut AnalyzeForm,
) -> Result<(), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") if form.upload.is_none() => {
                form.upload = store_upload(state, field).await?;
            }
            Some("tasks") => form.tasks.extend(parse_list_field(&read_text(field).await?)),
            Some("languages") => form
                .languages
                .extend(parse_list_field(&read_text(field).await?)),
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }
    Ok(())
}

async fn read_text(field: Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Unreadable form field: {e}")))
}

/// Stream a file field to `{upload_dir}/{uuid}_{name}`; empty file names count as absent
async fn store_upload(state: &ApiState, mut field: Field<'_>) -> Result<Option<StoredUpload>, ApiError> {
    let Some(file_name) = field.file_name().map(str::to_string).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    let mime_type = field.content_type().map(str::to_string);

    let mut safe_name = secure_file_name(&file_name);
    if safe_name.is_empty() {
        safe_name = "upload".to_string();
    }
    let path = state
        .config
        .upload_dir
        .join(format!("{}_{}", Uuid::new_v4().simple(), safe_name));

    let mut sink = tokio::fs::File::create(&path)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to store upload: {e}")))?;
    let mut size = 0u64;
    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                discard(&path).await;
                return Err(ApiError::BadRequest(format!("Upload interrupted: {e}")));
            }
        };
        if let Err(e) = sink.write_all(&chunk).await {
            discard(&path).await;
            return Err(ApiError::Internal(format!("Failed to store upload: {e}")));
        }
        size += chunk.len() as u64;
    }
    sink.flush()
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to store upload: {e}")))?;

    debug!("Stored upload {} at {}", file_name, path.display());
    Ok(Some(StoredUpload {
        file_name,
        mime_type,
        path,
        size,
    }))
}

async fn discard(path: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("Failed to remove upload {}: {}", path.display(), e);
    }
}

/// Snapshot of one job
pub async fn get_job(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    state
        .aggregator
        .executor()
        .registry()
        .get(&job_id)
        .await
        .map(Json)
        .ok_or(ApiError::JobNotFound(job_id))
}

/// Point-in-time map of every job
pub async fn list_jobs(State(state): State<ApiState>) -> Json<HashMap<String, Job>> {
    Json(state.aggregator.executor().registry().list().await)
}
