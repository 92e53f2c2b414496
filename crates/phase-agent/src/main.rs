//! Pod Phase Agent - pod lifecycle latency measurement
//!
//! Watches cluster events and reports how long pods spend being scheduled,
//! pulling images and mounting volumes.

use anyhow::{Context, Result};
use phase_lib::{
    health::{components, HealthRegistry},
    observability::{PhaseMetrics, StructuredLogger},
    EventWatcher, FanoutSink, KubeClusterQuery, PhaseHandler, WatchDispatcher,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting pod-phase-agent");

    let config = config::AgentConfig::load()?;
    info!(
        node_name = %config.node_name,
        namespace = config.namespace.as_deref().unwrap_or("*"),
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::WATCHER).await;
    health_registry.register(components::QUERY_BACKEND).await;

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let metrics = PhaseMetrics::new();
    let logger = StructuredLogger::new(&config.node_name);
    logger.log_startup(AGENT_VERSION, config.namespace.as_deref());

    // Every record goes to the log line and the Prometheus histogram
    let sink = FanoutSink::new()
        .with(Arc::new(logger.clone()))
        .with(Arc::new(metrics.clone()));
    let handler = PhaseHandler::new(
        Arc::new(KubeClusterQuery::new(client.clone())),
        Arc::new(sink),
    );

    let dispatcher = WatchDispatcher::new(
        handler,
        health_registry.clone(),
        metrics,
        logger.clone(),
    );
    let watcher = EventWatcher::new(client, config.watch_config(), dispatcher);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let mut watch_handle = tokio::spawn(watcher.run(shutdown_rx));

    let app_state = Arc::new(api::AppState::new(health_registry));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
        result = &mut watch_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("event watch ended"),
                Ok(Err(e)) => error!(error = %e, "Event watch failed"),
                Err(e) => error!(error = %e, "Event watch task panicked"),
            }
        }
    }

    let _ = shutdown_tx.send(());
    if !watch_handle.is_finished() {
        let _ = watch_handle.await;
    }
    api_handle.abort();
    info!("Shutting down");

    Ok(())
}
