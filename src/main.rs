mod api;
mod config;
mod engine;
mod error;
mod executor;
mod metrics;
mod models;

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use crate::{
    config::AppConfig, engine::DockerEngine, executor::Orchestrator, metrics::MetricsRegistry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env();
    init_tracing(&config);

    let engine = Arc::new(DockerEngine::connect().context("docker engine init failed")?);
    let metrics = Arc::new(MetricsRegistry::new());
    let orchestrator = Arc::new(Orchestrator::new(engine, &config, metrics.clone()));

    let app = api::routes(orchestrator, metrics);
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .context("failed to bind listener")?;
    tracing::info!(
        addr = %config.bind_addr,
        max_concurrent = config.max_concurrent_sandboxes,
        network = %config.sandbox_network,
        "code execution service listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_current_span(false)
        .with_span_list(false)
        .init();
}
