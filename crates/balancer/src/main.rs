//! Swarm Balancer - resource-aware dispatch for content-generation agents
//!
//! Hosts a load balancer over a simulated agent pool, feeds it synthetic
//! educational tasks and serves health, metrics and status over HTTP.

use anyhow::{Context, Result};
use balancer_lib::{
    collector::create_source, HostSample, LoadBalancer, MetricsSource,
    StaticMetricsSource,
};
use std::sync::Arc;
use swarm_balancer::{
    api,
    config::ServiceConfig,
    simulation::{register_pool, TaskDriver},
};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting swarm-balancer");

    let config = ServiceConfig::load()?;
    info!(
        service_name = %config.service_name,
        strategy = %config.balancer.strategy,
        workers = config.pool.workers.len(),
        "Service configured"
    );

    let source: Arc<dyn MetricsSource> = if config.pool.sample_host {
        create_source()
    } else {
        Arc::new(StaticMetricsSource::new(HostSample::default()))
    };

    let balancer = Arc::new(
        LoadBalancer::new(config.balancer.clone(), source)
            .context("Failed to create load balancer")?
            .with_service_name(config.service_name.clone()),
    );

    let workers = register_pool(&balancer, &config.pool)
        .await
        .context("Failed to register worker pool")?;
    balancer
        .initialize()
        .await
        .context("Failed to initialize load balancer")?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let app_state = Arc::new(api::AppState::new(Arc::clone(&balancer)));
    let api_handle = tokio::spawn(api::serve(
        config.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));
    let driver = TaskDriver::new(Arc::clone(&balancer), workers, &config.pool);
    let driver_handle = tokio::spawn(driver.run(shutdown_tx.subscribe()));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    let _ = shutdown_tx.send(());
    if let Err(e) = driver_handle.await {
        warn!(error = %e, "Task driver ended abnormally");
    }
    match api_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => warn!(error = %e, "API server task ended abnormally"),
    }

    let dropped = balancer.shutdown().await?;
    if !dropped.is_empty() {
        warn!(tasks = dropped.len(), "Queued batch tasks were not dispatched");
    }

    Ok(())
}
