//! Media analysis orchestration
//!
//! Decides which capabilities a request needs, runs the fast ones inline and
//! the slow ones as tracked background jobs.
//!
//! - [`TaskPlan`]: label set to execution plan classification
//! - [`JobRegistry`] / [`JobExecutor`]: job store and bounded worker pool
//! - [`ResultAggregator`]: inline analysis plus job submission for one upload

mod aggregator;
mod error;
mod jobs;
mod router;

pub use aggregator::{
    AnalysisRequest, AnalysisResponse, JobSummary, JobType, ResultAggregator,
    ENHANCEMENT_JOB_LABEL, SUBTITLE_JOB_LABEL,
};
pub use error::{OrchestratorError, Result};
pub use jobs::{
    Job, JobError, JobErrorKind, JobExecutor, JobHandle, JobRegistry, JobStatus, TransitionError,
    DEFAULT_CONCURRENCY,
};
pub use router::{
    parse_list_field, resolve_languages, resolve_tasks, TaskPlan, ANALYSIS_LABELS,
    DEFAULT_LANGUAGES, DEFAULT_TASKS, ENHANCEMENT_LABELS, MODERATION_LABELS, SUBTITLE_LABELS,
};
