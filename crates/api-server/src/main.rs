//! API Server Binary Entry Point

use anyhow::Context;
use media_insight_api_server::{start_server, ApiState, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let dotenv = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "media_insight_api_server=info,media_insight_orchestrator=info,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Ok(path) = dotenv {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    let config = ServerConfig::from_env();
    let addr = config.addr.clone();
    tracing::info!(
        "Uploads in {}, {} concurrent jobs",
        config.upload_dir.display(),
        config.job_concurrency
    );

    let state = ApiState::new(config).context("failed to initialise server state")?;

    tracing::info!("Starting Media Insight API Server");
    start_server(&addr, state)
        .await
        .with_context(|| format!("server on {addr} stopped"))?;

    Ok(())
}
