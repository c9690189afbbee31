// src/main.rs

//! jobcast service entry point.
//!
//! Wires the configuration, database pool, metrics hub and pipeline stages
//! together, starts the orchestrator and runs until SIGINT.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use jobcast::config::AppConfig;
use jobcast::fetch::{HttpFetcher, RetryPolicy};
use jobcast::metrics::MetricsHub;
use jobcast::models::{ScraperRegistry, SourceRegistry};
use jobcast::pipeline::{JobQueue, Orchestrator, OrchestratorConfig};
use jobcast::services::{
    spawn_flusher, DedupFilter, DiscoveryService, EnrichmentService, PersistenceConfig,
    PersistenceService,
};
use jobcast::storage::{self, PgJobStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter())),
        )
        .init();

    tracing::info!("Starting job processing pipeline service");

    // Any config validation error is fatal before the pipeline starts
    let sources = Arc::new(SourceRegistry::load(&config.companies_config)?);
    tracing::info!("Loaded {} companies for job discovery", sources.len());

    let scrapers = Arc::new(ScraperRegistry::load(&config.scrapers_config)?);
    tracing::info!("Loaded scrapers for {} companies", scrapers.len());

    tracing::info!("Connecting to database...");
    let pool = storage::postgres::connect(&config.postgres).await?;
    let store = Arc::new(PgJobStore::new(pool, config.persistence_batch_size));

    let hub = Arc::new(MetricsHub::new());
    let cancel = CancellationToken::new();

    if config.metrics.metrics_enabled {
        let hub = Arc::clone(&hub);
        let cancel = cancel.clone();
        let port = config.metrics.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = hub.serve(port, cancel).await {
                tracing::error!("Metrics server error: {e}");
            }
        });
    }

    let fetcher = Arc::new(HttpFetcher::new()?);
    let queue = Arc::new(JobQueue::new(config.queue_capacity, &hub)?);

    let discovery = Arc::new(DiscoveryService::new(
        Arc::clone(&fetcher),
        sources,
        &hub,
    )?);
    let enrichment = Arc::new(EnrichmentService::new(
        Arc::clone(&fetcher),
        scrapers,
        RetryPolicy::default(),
        &hub,
    )?);
    let persistence = Arc::new(PersistenceService::new(
        store,
        PersistenceConfig {
            buffered: config.persistence_buffered,
            ..Default::default()
        },
    ));
    if config.persistence_buffered {
        spawn_flusher(Arc::clone(&persistence), cancel.clone());
    }

    let orchestrator = Arc::new(Orchestrator::new(
        OrchestratorConfig {
            discovery_interval: Duration::from_secs(config.discovery_interval_secs),
            workers: config.enrichment_workers,
            ..Default::default()
        },
        discovery,
        enrichment,
        persistence,
        Arc::new(DedupFilter::new()),
        queue,
        cancel.clone(),
    ));

    orchestrator.start();

    let status = orchestrator.status();
    tracing::info!(
        "Pipeline started - discovery companies: {}, enrichment companies: {}, queue size: {}",
        status.discovery_sources,
        status.enrichment_scrapers,
        status.queue_size
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, stopping services gracefully...");

    let metrics = orchestrator.metrics();
    tracing::info!(
        "Final metrics - jobs processed: {}, success rate: {:.2}%, discovery cycles: {}",
        metrics.jobs_processed,
        metrics.success_rate,
        metrics.discovery_cycles
    );

    orchestrator.stop().await;
    cancel.cancel();

    tracing::info!("Application shutdown complete");
    Ok(())
}
