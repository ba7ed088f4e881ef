//! Assembly of one analysis response
//!
//! Runs the synchronous analysis (with the moderation fallback) inline and
//! submits subtitle generation and enhancement as background jobs.

use media_insight_common::{MediaDescriptor, MediaType};
use media_insight_enhancement::EnhancementEngine;
use media_insight_inference::{AnalysisReport, InferenceBackend, ModerationVerdict};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{OrchestratorError, Result};
use crate::jobs::{JobError, JobErrorKind, JobExecutor, JobHandle};
use crate::router::TaskPlan;

pub const SUBTITLE_JOB_LABEL: &str = "generate-subtitles";
pub const ENHANCEMENT_JOB_LABEL: &str = "enhance-media";

/// Kind of background job listed in a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Subtitles,
    Enhancement,
}

/// Handle of a submitted job plus its type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    #[serde(flatten)]
    pub handle: JobHandle,
    #[serde(rename = "type")]
    pub job_type: JobType,
}

/// One stored upload to analyze
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Original client-side file name
    pub file_name: String,
    /// Where the upload is stored
    pub media_path: PathBuf,
    pub descriptor: MediaDescriptor,
    pub tasks: Vec<String>,
    pub languages: Vec<String>,
    /// Delete the upload once the analysis and every job using it are done
    pub remove_when_done: bool,
}

/// Shared hold on a stored upload; the last holder removes it when asked to
struct UploadLease {
    path: PathBuf,
    remove: bool,
}

impl UploadLease {
    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UploadLease {
    fn drop(&mut self) {
        if !self.remove {
            return;
        }
        let path = std::mem::take(&mut self.path);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { remove_upload(&path).await });
            }
            Err(_) => {
                if let Err(e) = std::fs::remove_file(&path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove upload {}: {}", path.display(), e);
                    }
                }
            }
        }
    }
}

async fn remove_upload(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed upload {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove upload {}: {}", path.display(), e),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub file_name: String,
    pub media_type: MediaType,
    pub languages: Vec<String>,
    pub tasks: Vec<String>,
    pub analysis: Option<AnalysisReport>,
    pub moderation: Option<ModerationVerdict>,
    pub jobs: Vec<JobSummary>,
}

/// Merges inline analysis with queued job handles
#[derive(Clone)]
pub struct ResultAggregator {
    backend: Arc<dyn InferenceBackend>,
    enhancer: Arc<dyn EnhancementEngine>,
    executor: JobExecutor,
}

impl ResultAggregator {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        enhancer: Arc<dyn EnhancementEngine>,
        executor: JobExecutor,
    ) -> Self {
        Self {
            backend,
            enhancer,
            executor,
        }
    }

    #[must_use]
    pub fn executor(&self) -> &JobExecutor {
        &self.executor
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn InferenceBackend> {
        &self.backend
    }

    /// Serve one analysis request
    ///
    /// Returns once the synchronous part is done; job payloads are fetched
    /// later through the registry.
    pub async fn run(&self, request: AnalysisRequest) -> Result<AnalysisResponse> {
        let lease = Arc::new(UploadLease {
            path: request.media_path.clone(),
            remove: request.remove_when_done,
        });
        if tokio::fs::metadata(&request.media_path).await.is_err() {
            return Err(OrchestratorError::Input(format!(
                "uploaded media not found: {}",
                request.media_path.display()
            )));
        }

        let plan = TaskPlan::from_labels(request.tasks.as_slice());
        debug!("Plan for {}: {:?}", request.file_name, plan);

        let mut analysis = None;
        let mut moderation = None;
        if plan.needs_analysis_call() {
            let report = self
                .backend
                .analyze_media(
                    &request.media_path,
                    &request.descriptor,
                    &request.tasks,
                    &request.languages,
                )
                .await?;
            moderation = report.moderation.clone();
            analysis = Some(report);
        }

        if plan.moderation_requested && moderation.is_none() {
            debug!("Analysis carried no moderation, calling dedicated moderation");
            moderation = Some(
                self.backend
                    .moderate_media(&request.media_path, &request.descriptor)
                    .await?,
            );
        }

        let mut jobs = Vec::with_capacity(plan.job_count());
        if plan.subtitles_requested {
            jobs.push(self.submit_subtitles(&request, lease.clone()).await);
        }
        if plan.enhancement_requested {
            jobs.push(self.submit_enhancement(&request, lease.clone()).await);
        }

        info!(
            "Analyzed {} ({}): analysis={} moderation={} jobs={}",
            request.file_name,
            request.descriptor.media_type,
            analysis.is_some(),
            moderation.is_some(),
            jobs.len()
        );

        Ok(AnalysisResponse {
            file_name: request.file_name,
            media_type: request.descriptor.media_type,
            languages: request.languages,
            tasks: request.tasks,
            analysis,
            moderation,
            jobs,
        })
    }

    async fn submit_subtitles(&self, request: &AnalysisRequest, lease: Arc<UploadLease>) -> JobSummary {
        let backend = self.backend.clone();
        let descriptor = request.descriptor.clone();
        let languages = request.languages.clone();

        let handle = self
            .executor
            .submit(SUBTITLE_JOB_LABEL, move || async move {
                let bundle = backend
                    .generate_subtitles(lease.path(), &descriptor, &languages)
                    .await?;
                job_payload(JobType::Subtitles, &bundle)
            })
            .await;

        JobSummary {
            handle,
            job_type: JobType::Subtitles,
        }
    }

    async fn submit_enhancement(&self, request: &AnalysisRequest, lease: Arc<UploadLease>) -> JobSummary {
        let enhancer = self.enhancer.clone();
        let descriptor = request.descriptor.clone();

        let handle = self
            .executor
            .submit(ENHANCEMENT_JOB_LABEL, move || async move {
                let path = lease.path().to_path_buf();
                let report = tokio::task::spawn_blocking(move || enhancer.enhance(&path, &descriptor))
                    .await
                    .map_err(|e| {
                        if e.is_panic() {
                            std::panic::resume_unwind(e.into_panic());
                        }
                        JobError::new(JobErrorKind::Internal, "enhancement task was cancelled")
                    })??;
                job_payload(JobType::Enhancement, &report)
            })
            .await;

        JobSummary {
            handle,
            job_type: JobType::Enhancement,
        }
    }
}

/// `{"type": ..., "payload": ...}` result stored on a completed job
fn job_payload<T: Serialize>(
    job_type: JobType,
    payload: &T,
) -> std::result::Result<serde_json::Value, JobError> {
    let payload = serde_json::to_value(payload)
        .map_err(|e| JobError::new(JobErrorKind::Internal, e.to_string()))?;
    Ok(serde_json::json!({ "type": job_type, "payload": payload }))
}
