//! CronJob Guardian - dead-man's switch, SLA tracking and alerting for
//! scheduled jobs

use anyhow::{Context, Result};
use chrono::Utc;
use cronjob_guardian::{api, config::Settings};
use guardian_lib::{
    engine::Engine, health::HealthRegistry, observability::StructuredLogger, policy::PolicyFile,
    registry::WatchRegistry, store::MemoryStore,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const GUARDIAN_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting cronjob-guardian");

    let settings = Settings::load()?;
    info!(identity = %settings.identity, leader_mode = ?settings.leader_mode, "Guardian configured");

    let policy = match &settings.policy_path {
        Some(path) => PolicyFile::load(Path::new(path))
            .with_context(|| format!("loading policy from {}", path))?,
        None => {
            warn!("No policy file configured, starting without monitors");
            PolicyFile::default()
        }
    };

    let health_registry = HealthRegistry::new();
    let engine = Arc::new(Engine::new(
        settings.engine_config(),
        Arc::new(WatchRegistry::new()),
        Arc::new(MemoryStore::new()),
        settings.leader_signal(),
        health_registry.clone(),
    ));
    engine.register_components().await;

    let problems = engine.load_policy(&policy, Utc::now()).await;
    if !problems.is_empty() {
        warn!(count = problems.len(), "Policy loaded with problems");
    }

    let logger = StructuredLogger::new(&settings.identity);
    logger.log_startup(GUARDIAN_VERSION, policy.monitors.len(), policy.channels.len());

    let app_state = Arc::new(api::AppState::new(Arc::clone(&engine)));
    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(settings.api_port, app_state));

    let (shutdown_tx, _) = broadcast::channel(1);
    let engine_handle = tokio::spawn(Arc::clone(&engine).run(shutdown_tx.clone()));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;

    let _ = shutdown_tx.send(());
    if let Err(e) = engine_handle.await {
        error!(error = %e, "Engine task failed");
    }
    api_handle.abort();
    info!("Shutdown complete");

    Ok(())
}
