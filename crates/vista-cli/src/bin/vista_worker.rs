//! Vista worker daemon
//!
//! Hosts the queues listed in `WORKER_QUEUES`, runs job maintenance and,
//! unless disabled, watches the media bucket for new objects.

use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use vista_cli::{init_tracing, shutdown_signal};
use vista_core::models::QueueName;
use vista_core::Config;
use vista_infra::{shutdown_telemetry, RateLimiter};
use vista_pipeline::{run_watcher, setup_pipeline, PipelineDispatcher};
use vista_worker::{WorkerPool, WorkerPoolConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate()?;
    init_tracing("vista-worker")?;

    let hosts_embedding = config.worker_queues().contains(&QueueName::Embedding);
    let (db_pool, state) = setup_pipeline(&config, hosts_embedding).await?;

    let pool = WorkerPool::start(
        state.jobs.store().clone(),
        Arc::new(PipelineDispatcher::new(state.clone())),
        RateLimiter::new(config.embedding_rate_limit()),
        WorkerPoolConfig::from_config(&config),
    );

    let shutdown = CancellationToken::new();
    let watcher = if config.watcher_enabled() {
        Some(tokio::spawn(run_watcher(
            state.storage.clone(),
            state.jobs.clone(),
            state.settings.media_bucket.clone(),
            config.watcher_poll_interval(),
            config.watcher_backfill(),
            shutdown.child_token(),
        )))
    } else {
        tracing::info!("Object watcher disabled");
        None
    };

    tracing::info!(
        worker.id = %pool.worker_id(),
        queues = ?pool.queues(),
        environment = %config.environment(),
        "Vista worker running"
    );

    shutdown_signal().await;
    tracing::info!("Shutting down gracefully...");

    shutdown.cancel();
    if let Some(watcher) = watcher {
        if let Err(e) = watcher.await {
            tracing::error!(error = %e, "Object watcher task failed");
        }
    }
    pool.shutdown().await;

    if let Some(runtime) = &state.inference {
        runtime.shutdown().await;
    }
    db_pool.close().await;
    shutdown_telemetry().await;

    Ok(())
}
