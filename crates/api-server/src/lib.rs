//! REST + WebSocket API server for media insight
//!
//! - `POST /api/ai/analyze`: inline analysis plus background subtitle / enhancement jobs
//! - `GET /api/ai/jobs/{job_id}`: job status polling
//! - `GET /api/ai/realtime`: streaming subtitle sessions over WebSocket

mod config;
mod error;
mod handlers;
mod realtime;
mod types;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use media_insight_enhancement::{EnhancementEngine, FilterEnhancer};
use media_insight_inference::{select_backend, InferenceBackend};
use media_insight_orchestrator::{JobExecutor, JobRegistry, ResultAggregator};
use media_insight_streaming::{SessionManager, StreamingTranscriber};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

pub use config::ServerConfig;
pub use error::{ApiError, ServerError};
pub use handlers::*;
pub use realtime::realtime;
pub use types::*;

/// API server state shared across handlers
#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<ServerConfig>,
    /// Analysis requests and the job registry behind them
    pub aggregator: ResultAggregator,
    /// Live realtime sessions
    pub sessions: SessionManager,
}

impl ApiState {
    /// Build state with the backend selected from `config.inference`
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let backend = select_backend(&config.inference)?;
        let enhancer = Arc::new(FilterEnhancer::new(std::env::temp_dir()));
        Self::with_collaborators(config, backend, enhancer)
    }

    /// Build state around explicit collaborators
    pub fn with_collaborators(
        config: ServerConfig,
        backend: Arc<dyn InferenceBackend>,
        enhancer: Arc<dyn EnhancementEngine>,
    ) -> Result<Self, ServerError> {
        std::fs::create_dir_all(&config.upload_dir)?;

        let executor = JobExecutor::new(JobRegistry::new(), config.job_concurrency);
        let sessions = SessionManager::new(
            config.upload_dir.clone(),
            StreamingTranscriber::new(backend.clone()),
        );

        Ok(Self {
            aggregator: ResultAggregator::new(backend, enhancer, executor),
            sessions,
            config: Arc::new(config),
        })
    }
}

/// Build the API router with all endpoints
pub fn build_router(state: ApiState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        // Health check
        .route("/health", get(health_check))
        .route("/api/ai/config", get(ai_config))
        .route("/api/ai/analyze", post(analyze))
        // Job polling
        .route("/api/ai/jobs", get(list_jobs))
        .route("/api/ai/jobs/{job_id}", get(get_job))
        .route("/api/ai/realtime", get(realtime))
        // Middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Periodically prune finished jobs and idle sessions
pub fn spawn_sweeper(state: ApiState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = state.config.sweep_interval.max(Duration::from_secs(1));
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let jobs = state
                .aggregator
                .executor()
                .registry()
                .prune_finished(state.config.job_retention)
                .await;
            let sessions = state.sessions.expire_idle(state.config.session_idle).await;
            debug!("Sweep removed {} jobs and {} sessions", jobs, sessions);
        }
    })
}

/// Serve on an already bound listener
pub async fn serve(listener: TcpListener, state: ApiState) -> Result<(), std::io::Error> {
    let sweeper = spawn_sweeper(state.clone());
    let app = build_router(state);
    let result = axum::serve(listener, app).await;
    sweeper.abort();
    result
}

/// Start the API server
pub async fn start_server(addr: &str, state: ApiState) -> Result<(), std::io::Error> {
    info!("Starting API server on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    serve(listener, state).await
}
